//! Conversation rating policy.

use crate::error::CoreError;

/// Lowest accepted rating.
pub const MIN_RATING: i16 = 1;

/// Highest accepted rating.
pub const MAX_RATING: i16 = 5;

/// Validate a raw rating value from a client.
///
/// The value must be a whole number in `[MIN_RATING, MAX_RATING]`.
pub fn validate_rating(value: f64) -> Result<i16, CoreError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(CoreError::Validation(
            "Rating must be a whole number".to_string(),
        ));
    }
    if value < f64::from(MIN_RATING) || value > f64::from(MAX_RATING) {
        return Err(CoreError::Validation(format!(
            "Rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    Ok(value as i16)
}

/// Who may rate a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatingMode {
    /// Only the conversation's buyer or seller may rate.
    #[default]
    Participants,
    /// Any identified user may rate.
    Open,
}

impl RatingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "participants" => Some(Self::Participants),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_whole_numbers_in_range() {
        for v in 1..=5 {
            assert_eq!(validate_rating(f64::from(v)).unwrap(), v as i16);
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert_matches!(
            validate_rating(0.0),
            Err(CoreError::Validation(msg)) if msg == "Rating must be between 1 and 5"
        );
        assert!(validate_rating(6.0).is_err());
        assert!(validate_rating(-3.0).is_err());
    }

    #[test]
    fn rejects_fractional_and_non_finite() {
        assert!(validate_rating(3.5).is_err());
        assert!(validate_rating(f64::NAN).is_err());
        assert!(validate_rating(f64::INFINITY).is_err());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(RatingMode::parse("Open"), Some(RatingMode::Open));
        assert_eq!(RatingMode::parse(" participants "), Some(RatingMode::Participants));
        assert_eq!(RatingMode::parse("anyone"), None);
    }

    #[test]
    fn default_mode_is_participants() {
        assert_eq!(RatingMode::default(), RatingMode::Participants);
    }
}
