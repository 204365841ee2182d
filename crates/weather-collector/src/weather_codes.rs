//! WMO weather interpretation codes used by Open-Meteo.
//!
//! See <https://open-meteo.com/en/docs> for the code list.

/// Label for codes missing from [`WEATHER_CODES`].
pub const UNKNOWN_CONDITION: &str = "unknown";

/// Code → condition label, sorted by code.
static WEATHER_CODES: &[(i64, &str)] = &[
    (0, "clear"),
    (1, "mainly_clear"),
    (2, "partly_cloudy"),
    (3, "overcast"),
    (45, "fog"),
    (48, "fog"),
    (51, "drizzle"),
    (53, "drizzle"),
    (55, "drizzle"),
    (56, "freezing_drizzle"),
    (57, "freezing_drizzle"),
    (61, "rain"),
    (63, "rain"),
    (65, "heavy_rain"),
    (66, "freezing_rain"),
    (67, "freezing_rain"),
    (71, "snow"),
    (73, "snow"),
    (75, "heavy_snow"),
    (77, "snow_grains"),
    (80, "rain_showers"),
    (81, "rain_showers"),
    (82, "heavy_rain_showers"),
    (85, "snow_showers"),
    (86, "heavy_snow_showers"),
    (95, "thunderstorm"),
    (96, "thunderstorm_hail"),
    (99, "thunderstorm_hail"),
];

/// Map a WMO weather code to its condition label.
///
/// Unknown codes yield [`UNKNOWN_CONDITION`] rather than an error.
pub fn condition_for_code(code: i64) -> &'static str {
    WEATHER_CODES
        .binary_search_by_key(&code, |(c, _)| *c)
        .map(|idx| WEATHER_CODES[idx].1)
        .unwrap_or(UNKNOWN_CONDITION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(WEATHER_CODES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_clear_and_cloudy() {
        assert_eq!(condition_for_code(0), "clear");
        assert_eq!(condition_for_code(2), "partly_cloudy");
        assert_eq!(condition_for_code(3), "overcast");
    }

    #[test]
    fn test_rain_codes() {
        assert_eq!(condition_for_code(61), "rain");
        assert_eq!(condition_for_code(63), "rain");
        assert_eq!(condition_for_code(65), "heavy_rain");
        assert_eq!(condition_for_code(82), "heavy_rain_showers");
    }

    #[test]
    fn test_snow_and_storm_codes() {
        assert_eq!(condition_for_code(71), "snow");
        assert_eq!(condition_for_code(75), "heavy_snow");
        assert_eq!(condition_for_code(95), "thunderstorm");
        assert_eq!(condition_for_code(99), "thunderstorm_hail");
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(condition_for_code(999), UNKNOWN_CONDITION);
        assert_eq!(condition_for_code(-1), UNKNOWN_CONDITION);
        assert_eq!(condition_for_code(4), UNKNOWN_CONDITION);
    }

    #[test]
    fn test_every_label_is_non_empty() {
        assert!(WEATHER_CODES.iter().all(|(_, label)| !label.is_empty()));
    }
}
