/// The comic projection consulted by ranking: the image URL for rendering a
/// result and the stem set driving the score.
#[derive(Debug, Clone, PartialEq)]
pub struct Comic {
    pub id: i64,
    pub url: String,
    pub words: Vec<String>,
}
