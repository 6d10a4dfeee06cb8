//! Agreement terms documents.

use chrono::Utc;
use selfkit_interactive::AgreementTerms;
use selfkit_lib::{Address, Object};

pub const TERMS_MIME: &str = "text/plain";

/// Plain-text terms naming both parties and the signing date.
#[derive(Debug, Clone)]
pub struct PlainTextTerms {
    title: String,
}

impl PlainTextTerms {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn render(&self, issuer: &Address, counterparty: &Address) -> String {
        format!(
            "{title}\n\n\
             This agreement is made on {date} between:\n\n\
             \x20 Party A: {issuer}\n\
             \x20 Party B: {counterparty}\n\n\
             Both parties confirm they have read and accept these terms.\n",
            title = self.title,
            date = Utc::now().format("%Y-%m-%d"),
        )
    }
}

impl Default for PlainTextTerms {
    fn default() -> Self {
        Self::new("Sample Agreement")
    }
}

impl AgreementTerms for PlainTextTerms {
    fn document(&self, issuer: &Address, counterparty: &Address) -> Object {
        Object::new(TERMS_MIME, self.render(issuer, counterparty).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_names_both_parties() {
        let a = Address::from_bytes([1; 32]);
        let b = Address::from_bytes([2; 32]);
        let object = PlainTextTerms::default().document(&a, &b);

        assert_eq!(object.mime(), TERMS_MIME);
        assert!(object.is_intact());
        let text = String::from_utf8(object.data().to_vec()).unwrap();
        assert!(text.starts_with("Sample Agreement"));
        assert!(text.contains(&a.to_string()));
        assert!(text.contains(&b.to_string()));
    }
}
