use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN: Regex = Regex::new("[A-Za-z0-9]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Normalize a phrase into an ordered, deduplicated list of stems.
///
/// All-digit tokens are kept verbatim (comic numbers and years are searchable);
/// everything else is lowercased, stop-word filtered, and stemmed.
pub fn normalize(phrase: &str) -> Vec<String> {
    if phrase.is_empty() {
        return Vec::new();
    }

    let nfkc = phrase.nfkc().collect::<String>();

    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for mat in TOKEN.find_iter(&nfkc) {
        let word = mat.as_str().to_lowercase();

        if is_digits(&word) {
            if seen.insert(word.clone()) {
                out.push(word);
            }
            continue;
        }

        if STOPWORDS.contains(word.as_str()) {
            continue;
        }

        let stem = STEMMER.stem(&word).to_string();
        if seen.insert(stem.clone()) {
            out.push(stem);
        }
    }

    out
}
