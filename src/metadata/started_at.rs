use super::{MetadataFactory, MetadataType};
use crate::state::FileState;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

pub const SUFFIX: &str = "_startedat";

/// Wall-clock time at which an upload began, as RFC 3339 text. Sweepers
/// use it to expire abandoned uploads.
#[derive(Debug)]
pub struct StartedAt;

impl MetadataType for StartedAt {
    fn suffix(&self) -> String {
        SUFFIX.to_owned()
    }

    fn movable(&self) -> bool {
        false
    }

    fn valid_state(&self, state: FileState) -> bool {
        state == FileState::Upload
    }
}

pub(super) struct Factory;

impl MetadataFactory for Factory {
    fn create(&self, _suffix: &str) -> Option<Arc<dyn MetadataType>> {
        Some(Arc::new(StartedAt))
    }
}

/// Serialize the current time.
pub fn now_bytes() -> Vec<u8> {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .into_bytes()
}

/// Parse a serialized timestamp.
pub fn parse(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let text = std::str::from_utf8(bytes).ok()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes = now_bytes();
        let parsed = parse(&bytes).unwrap();
        assert!((Utc::now() - parsed).num_seconds() < 5);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(parse(b"yesterday").is_none());
        assert!(parse(&[0xff, 0xfe]).is_none());
    }
}
