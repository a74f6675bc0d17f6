//! User directory projection.

use serde::Serialize;
use sqlx::FromRow;

/// Name fields of a row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserName {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserName {
    /// `"first last"`, trimmed; empty when neither part is set.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(first: Option<&str>, last: Option<&str>) -> UserName {
        UserName {
            id: "u1".into(),
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
        }
    }

    #[test]
    fn joins_both_parts() {
        assert_eq!(name(Some("Asha"), Some("Rao")).display_name(), "Asha Rao");
    }

    #[test]
    fn trims_missing_parts() {
        assert_eq!(name(Some("Asha"), None).display_name(), "Asha");
        assert_eq!(name(None, Some("Rao")).display_name(), "Rao");
        assert_eq!(name(None, None).display_name(), "");
    }
}
