// Built-in spam heuristic: messages padded out of single characters
// ("b u y  c h e a p ...") to dodge keyword filters.
//
// The real probabilistic model lives behind the same `ClassifierPort`
// outside this crate; this adapter is the cheap always-available
// pre-filter and the default classifier for local runs.

use crate::core::moderation::{Classification, ClassifierPort};
use async_trait::async_trait;

pub struct SingleCharClassifier {
    /// Flag as spam once this share of words are single characters.
    threshold: f64,
}

impl SingleCharClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn looks_fragmented(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < 10 {
            return false;
        }
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        if words.len() < 3 {
            return false;
        }

        let single_chars = words
            .iter()
            .filter(|word| {
                let mut alnum = word.chars().filter(|c| c.is_alphanumeric());
                matches!((alnum.next(), alnum.next()), (Some(_), None))
            })
            .count();

        single_chars as f64 / words.len() as f64 > self.threshold
    }
}

impl Default for SingleCharClassifier {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[async_trait]
impl ClassifierPort for SingleCharClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<Classification> {
        if self.looks_fragmented(text) {
            Ok(Classification {
                is_spam: true,
                probability: 0.95,
            })
        } else {
            Ok(Classification {
                is_spam: false,
                probability: 0.0,
            })
        }
    }
}
