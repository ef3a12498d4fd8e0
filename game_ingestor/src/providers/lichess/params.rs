use crate::models::request_params::GamesRequestParams;

/// Builds the query string for the game export endpoint.
///
/// We always ask for SAN movetext and tags but no clocks, evals or opening
/// names, which keeps each NDJSON line small. `until`/`since` are epoch
/// milliseconds.
pub fn construct_params(params: &GamesRequestParams) -> Vec<(String, String)> {
    let mut query = vec![
        ("moves".to_string(), "true".to_string()),
        ("tags".to_string(), "true".to_string()),
        ("clocks".to_string(), "false".to_string()),
        ("evals".to_string(), "false".to_string()),
        ("opening".to_string(), "false".to_string()),
        ("pgnInJson".to_string(), "false".to_string()),
        ("sort".to_string(), "dateDesc".to_string()),
    ];
    if let Some(max) = params.max {
        query.push(("max".to_string(), max.to_string()));
    }
    if let Some(until) = params.until {
        query.push(("until".to_string(), until.timestamp_millis().to_string()));
    }
    if let Some(since) = params.since {
        query.push(("since".to_string(), since.timestamp_millis().to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn window_bounds_are_epoch_millis() {
        let until = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let params = GamesRequestParams {
            username: "someone".into(),
            until: Some(until),
            since: None,
            max: Some(200),
        };
        let q = construct_params(&params);
        assert!(q.contains(&("max".to_string(), "200".to_string())));
        assert!(q.contains(&("until".to_string(), "1706745600000".to_string())));
        assert!(!q.iter().any(|(k, _)| k == "since"));
    }
}
