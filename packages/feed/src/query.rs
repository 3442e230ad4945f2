//! Builds USGS FDSN event queries from validated parameters.
//!
//! Dates are whole UTC calendar days counted back from "today", so two
//! identical requests made either side of UTC midnight can produce
//! different ranges. That is expected.

use chrono::{Days, NaiveDate};
use quake_map_quake_models::{BoundingBox, QueryParameters};

/// Date format the feed expects for `starttime`/`endtime`.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A fully specified earthquake feed query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedQuery {
    /// Minimum magnitude, inclusive.
    pub min_magnitude: f64,
    /// First calendar day of the window (UTC).
    pub start_date: NaiveDate,
    /// Last calendar day of the window (UTC).
    pub end_date: NaiveDate,
    /// Spatial filter for region-scoped queries.
    pub bounding_box: Option<BoundingBox>,
}

impl FeedQuery {
    /// Builds the query for `params` as seen on `today`.
    #[must_use]
    pub fn build(params: &QueryParameters, today: NaiveDate) -> Self {
        let start_date = today
            .checked_sub_days(Days::new(u64::from(params.days)))
            .unwrap_or(NaiveDate::MIN);

        Self {
            min_magnitude: params.min_magnitude,
            start_date,
            end_date: today,
            bounding_box: params.region.map(|r| r.bounding_box()),
        }
    }

    /// Query string pairs in the order they are sent.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("format", "geojson".to_string()),
            ("minmagnitude", self.min_magnitude.to_string()),
            ("starttime", self.start_date.format(DATE_FORMAT).to_string()),
            ("endtime", self.end_date.format(DATE_FORMAT).to_string()),
        ];

        if let Some(bbox) = self.bounding_box {
            pairs.push(("minlatitude", bbox.min_latitude.to_string()));
            pairs.push(("maxlatitude", bbox.max_latitude.to_string()));
            pairs.push(("minlongitude", bbox.min_longitude.to_string()));
            pairs.push(("maxlongitude", bbox.max_longitude.to_string()));
        }

        pairs
    }
}

/// Today's UTC calendar date.
#[must_use]
pub fn today_utc() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use quake_map_quake_models::{RawQueryArgs, Region};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lookup<'a>(pairs: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn california_query_carries_exact_bounding_box() {
        let params = QueryParameters {
            min_magnitude: 3.0,
            days: 7,
            region: Some(Region::California),
        };
        let pairs = FeedQuery::build(&params, date(2025, 3, 10)).to_query_pairs();

        assert_eq!(lookup(&pairs, "format"), Some("geojson"));
        assert_eq!(lookup(&pairs, "minmagnitude"), Some("3"));
        assert_eq!(lookup(&pairs, "starttime"), Some("2025-03-03"));
        assert_eq!(lookup(&pairs, "endtime"), Some("2025-03-10"));
        assert_eq!(lookup(&pairs, "minlatitude"), Some("32"));
        assert_eq!(lookup(&pairs, "maxlatitude"), Some("42"));
        assert_eq!(lookup(&pairs, "minlongitude"), Some("-125"));
        assert_eq!(lookup(&pairs, "maxlongitude"), Some("-114"));
        assert_eq!(pairs.len(), 8);
    }

    #[test]
    fn unfiltered_query_has_no_bounding_box() {
        for region in [None, Some("nevada"), Some("")] {
            let params = QueryParameters::from_raw(RawQueryArgs {
                min_magnitude: Some(4.5),
                days: Some(30.0),
                region: region.map(str::to_string),
            });
            let pairs = FeedQuery::build(&params, date(2025, 3, 10)).to_query_pairs();

            assert_eq!(pairs.len(), 4, "region {region:?} should not add a box");
            assert!(lookup(&pairs, "minlatitude").is_none());
            assert_eq!(lookup(&pairs, "minmagnitude"), Some("4.5"));
            assert_eq!(lookup(&pairs, "starttime"), Some("2025-02-08"));
        }
    }

    #[test]
    fn window_crosses_year_boundary() {
        let params = QueryParameters {
            min_magnitude: 0.0,
            days: 90,
            region: None,
        };
        let query = FeedQuery::build(&params, date(2025, 1, 15));
        assert_eq!(query.start_date, date(2024, 10, 17));
        assert_eq!(query.end_date, date(2025, 1, 15));
    }
}
