use chrono_tz::Tz;

use crate::domain::error::DomainError;

/// Parse an IANA zone name such as `Europe/Paris`.
pub fn parse_timezone(name: &str) -> Result<Tz, DomainError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DomainError::validation(format!("unknown timezone `{name}`")))
}

/// Label appended to cache keys for a site timezone.
pub fn timezone_label(timezone: Option<Tz>) -> Option<&'static str> {
    timezone.map(|tz| tz.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_zones() {
        let tz = parse_timezone(" Europe/Paris ").expect("known zone");
        assert_eq!(timezone_label(Some(tz)), Some("Europe/Paris"));
        assert_eq!(timezone_label(None), None);
    }

    #[test]
    fn rejects_unknown_zones() {
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
