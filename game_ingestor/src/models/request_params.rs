use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Universal parameters for requesting a player's game history from any source.
///
/// Sources return games newest-first within `[since, until)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GamesRequestParams {
    /// The player whose history is requested.
    pub username: String,

    /// Exclusive upper bound on game creation time. `None` means "up to now".
    pub until: Option<DateTime<Utc>>,

    /// Inclusive lower bound on game creation time. `None` means unbounded.
    pub since: Option<DateTime<Utc>>,

    /// Maximum number of records to return. `None` lets the source stream everything.
    pub max: Option<u32>,
}

impl GamesRequestParams {
    /// Request the newest `max` games of `username`.
    pub fn newest(username: impl Into<String>, max: u32) -> Self {
        Self {
            username: username.into(),
            until: None,
            since: None,
            max: Some(max),
        }
    }

    /// True when the window `[since, until)` cannot contain any game.
    pub fn is_empty_window(&self) -> bool {
        matches!((self.since, self.until), (Some(since), Some(until)) if until <= since)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn empty_window_detection() {
        let now = Utc::now();
        let mut p = GamesRequestParams::newest("someone", 10);
        assert!(!p.is_empty_window());

        p.since = Some(now);
        p.until = Some(now - Duration::seconds(1));
        assert!(p.is_empty_window());

        p.until = Some(now + Duration::seconds(1));
        assert!(!p.is_empty_window());
    }
}
