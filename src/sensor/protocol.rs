//! urSense board text protocol.
//!
//! Each report is one space-delimited line:
//!
//! ```text
//! selE <mode> <uptime> s usid <id> skwt <t> C brig <b>% airr <r> kOhm humi <h>% atpr <p> mbar prst <t> C [...]
//! ```
//!
//! The first token is a start marker, the second selects the report mode. The
//! remaining tokens are positional; which of them exist depends on the mode:
//!
//! | mode   | fields | contents                                              |
//! |--------|--------|-------------------------------------------------------|
//! | `envm` | 22     | environment only                                      |
//! | `envs` | 37     | environment, GPS time and location, altitude, sun     |
//! | `envt` | -      | environment with time (not implemented)               |
//! | `envl` | -      | environment with location (not implemented)           |
//! | `enve` | -      | environment with time and location (not implemented)  |
//!
//! The board prints a banner on start-up, so lines without the start marker are
//! expected noise rather than errors.

use std::fmt;

use super::{Reading, SensorLog};

/// Start marker of every report line.
pub const START_TOKEN: &str = "selE";

/// Fields shared by every report mode.
pub const MIN_FIELDS: usize = 22;

/// Field count of an `envm` report.
pub const ENVM_FIELDS: usize = 22;

/// Field count of an `envs` report.
pub const ENVS_FIELDS: usize = 37;

/// Report modes the board can emit but this parser does not implement.
pub const UNSUPPORTED_MODES: [&str; 3] = ["envt", "envl", "enve"];

/// Result of parsing a line that was not rejected as unsupported.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseOutcome {
    /// A complete log.
    Log(SensorLog),
    /// No start marker; the board is still printing its start-up banner.
    NotReady,
    /// The line had the start marker but could not be understood.
    Malformed(String),
}

impl ParseOutcome {
    /// The parsed log, if any.
    pub fn into_log(self) -> Option<SensorLog> {
        match self {
            ParseOutcome::Log(log) => Some(log),
            ParseOutcome::NotReady | ParseOutcome::Malformed(_) => None,
        }
    }
}

/// A recognised report mode that has no parser.
///
/// Kept distinct from malformed input: the board sent a valid report, this
/// crate just cannot read it yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsupportedMode {
    pub mode: String,
}

impl fmt::Display for UnsupportedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported urSense report mode `{}`", self.mode)
    }
}

impl std::error::Error for UnsupportedMode {}

/// Parse one line of urSense output, stamping it with the current time.
pub fn parse_ursense(line: &str) -> Result<ParseOutcome, UnsupportedMode> {
    parse_ursense_at(line, crate::unix_now())
}

/// Parse one line of urSense output observed at `system_time`.
///
/// Time and location fields reported by the board are kept as separate
/// optional fields; they never replace `system_time`.
pub fn parse_ursense_at(line: &str, system_time: f64) -> Result<ParseOutcome, UnsupportedMode> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    if fields.first() != Some(&START_TOKEN) {
        return Ok(ParseOutcome::NotReady);
    }

    if fields.len() < MIN_FIELDS {
        log::warn!(
            "Expected at least {} fields, got {}",
            MIN_FIELDS,
            fields.len()
        );
        return Ok(malformed(format!("{} fields", fields.len())));
    }

    let mode = fields[1];
    if UNSUPPORTED_MODES.contains(&mode) {
        log::error!("urSense report mode `{}` is not supported", mode);
        return Err(UnsupportedMode {
            mode: mode.to_string(),
        });
    }

    let expected = match mode {
        "envm" => ENVM_FIELDS,
        "envs" => ENVS_FIELDS,
        _ => {
            log::warn!("Sensor reading invalid report type field `{}`", mode);
            return Ok(malformed(format!("report type `{}`", mode)));
        }
    };
    if fields.len() != expected {
        log::warn!(
            "Expected {} fields for type `{}`, got {}",
            expected,
            mode,
            fields.len()
        );
        return Ok(malformed(format!("{} fields for `{}`", fields.len(), mode)));
    }

    let log = match parse_fields(&fields, system_time) {
        Ok(log) => log,
        Err(reason) => {
            log::warn!("Sensor reading could not be parsed: {}", reason);
            return Ok(malformed(reason));
        }
    };
    Ok(ParseOutcome::Log(log))
}

fn malformed(reason: String) -> ParseOutcome {
    ParseOutcome::Malformed(reason)
}

/// Build a log from a field list whose length already matches its mode.
fn parse_fields(fields: &[&str], system_time: f64) -> Result<SensorLog, String> {
    let mut log = SensorLog {
        system_time,
        ursense_id: Some(fields[5].to_string()),
        temperature_skwt: Some(reading(fields[7], fields[8])?),
        brightness: Some(percentage(fields[10])?),
        air_quality: Some(reading(fields[12], fields[13])?),
        humidity: Some(percentage(fields[15])?),
        pressure: Some(reading(fields[17], fields[18])?),
        temperature_prst: Some(reading(fields[20], fields[21])?),
        ..SensorLog::default()
    };

    if fields.len() == ENVS_FIELDS {
        log.gps_time = Some(fields[22..26].join(" "));
        log.gps_location = Some(fields[26..28].join(" "));
        log.altitude = Some(reading(fields[29], fields[30])?);
        // fields[33] is a compass point, not a unit.
        log.sun_azimuth = Some(reading(fields[32], "deg")?);
        log.sun_altitude = Some(reading(fields[35], fields[36])?);
    }

    Ok(log)
}

fn reading(value: &str, units: &str) -> Result<Reading, String> {
    Ok(Reading::new(number(value)?, units))
}

fn percentage(value: &str) -> Result<Reading, String> {
    Ok(Reading::new(number(value.trim_end_matches('%'))?, "%"))
}

fn number(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("`{}` is not a number", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVM_LINE: &str = "selE envm 2.800 s usid 0123456789ab skwt 24.6 C brig 1.86% airr 4.69 kOhm humi 35.2% atpr 1002.8 mbar prst 25.3 C\n";
    const ENVS_LINE: &str = "selE envs 114.205 s usid 0123456789ab skwt 25.2 C brig 1.27% airr 5.47 kOhm humi 35.1% atpr 1003 mbar prst 25.7 C Fri 30.04.2021 20;25;20.123 E1+0000 50.36194N 4.74472W alti 108 m sazi 116.123 WNW salt -1.123 deg\n";

    fn parse_log(line: &str) -> SensorLog {
        match parse_ursense_at(line, 42.0).expect("supported mode") {
            ParseOutcome::Log(log) => log,
            other => panic!("expected a log, got {:?}", other),
        }
    }

    #[test]
    fn parses_envm_report() {
        let log = parse_log(ENVM_LINE);
        assert_eq!(
            log,
            SensorLog {
                system_time: 42.0,
                ursense_id: Some("0123456789ab".to_string()),
                brightness: Some(Reading::new(1.86, "%")),
                humidity: Some(Reading::new(35.2, "%")),
                pressure: Some(Reading::new(1002.8, "mbar")),
                temperature_skwt: Some(Reading::new(24.6, "C")),
                temperature_prst: Some(Reading::new(25.3, "C")),
                air_quality: Some(Reading::new(4.69, "kOhm")),
                ..SensorLog::default()
            }
        );
        assert!(log.gps_time.is_none());
        assert!(log.sun_altitude.is_none());
    }

    #[test]
    fn parses_envs_report() {
        let log = parse_log(ENVS_LINE);
        assert_eq!(log.ursense_id.as_deref(), Some("0123456789ab"));
        assert_eq!(log.brightness, Some(Reading::new(1.27, "%")));
        assert_eq!(log.pressure, Some(Reading::new(1003.0, "mbar")));
        assert_eq!(
            log.gps_time.as_deref(),
            Some("Fri 30.04.2021 20;25;20.123 E1+0000")
        );
        assert_eq!(log.gps_location.as_deref(), Some("50.36194N 4.74472W"));
        assert_eq!(log.altitude, Some(Reading::new(108.0, "m")));
        assert_eq!(log.sun_azimuth, Some(Reading::new(116.123, "deg")));
        assert_eq!(log.sun_altitude, Some(Reading::new(-1.123, "deg")));
    }

    #[test]
    fn system_time_comes_from_observer() {
        let before = crate::unix_now();
        let log = parse_ursense(ENVS_LINE)
            .expect("supported mode")
            .into_log()
            .expect("log");
        assert!(log.system_time >= before);
        assert!(log.system_time <= crate::unix_now());
    }

    #[test]
    fn unsupported_modes_are_distinct_from_malformed() {
        for mode in ["envt", "envl", "enve"] {
            let line = ENVM_LINE.replacen("envm", mode, 1);
            let err = parse_ursense_at(&line, 0.0).unwrap_err();
            assert_eq!(err.mode, mode);
        }
    }

    #[test]
    fn startup_banner_is_not_ready() {
        let banner = "urSense 1.28... commands:\n  e show environment sensor measurements\n  L toggle PPS on LED D5\n";
        assert_eq!(parse_ursense_at(banner, 0.0), Ok(ParseOutcome::NotReady));
        assert_eq!(parse_ursense_at("", 0.0), Ok(ParseOutcome::NotReady));
    }

    #[test]
    fn wrong_start_token_is_not_ready() {
        let line = ENVM_LINE.replacen("selE", "selF", 1);
        assert_eq!(parse_ursense_at(&line, 0.0), Ok(ParseOutcome::NotReady));
    }

    #[test]
    fn too_few_fields_is_malformed() {
        let outcome = parse_ursense_at("selE envm 2.800 s usid 0123456789ab", 0.0)
            .expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));

        // Short lines are rejected before the mode is looked at.
        let outcome = parse_ursense_at("selE envt 2.800 s", 0.0).expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));
    }

    #[test]
    fn unknown_mode_is_malformed() {
        let line = ENVM_LINE.replacen("envm", "envx", 1);
        let outcome = parse_ursense_at(&line, 0.0).expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));
    }

    #[test]
    fn field_count_must_match_mode() {
        let envs_as_envm = ENVS_LINE.replacen("envs", "envm", 1);
        let outcome = parse_ursense_at(&envs_as_envm, 0.0).expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));

        let envm_as_envs = ENVM_LINE.replacen("envm", "envs", 1);
        let outcome = parse_ursense_at(&envm_as_envs, 0.0).expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));
    }

    #[test]
    fn non_numeric_value_is_malformed() {
        let line = ENVM_LINE.replacen("24.6", "hot", 1);
        let outcome = parse_ursense_at(&line, 0.0).expect("no unsupported signal");
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));
    }
}
