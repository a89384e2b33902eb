//! CSV feed parsing.
//!
//! The feed describes itself: the first line with at least two
//! comma-separated tokens names the columns, every later line carries one
//! value per column. Columns are routed by name through a table built once
//! per process, so reordered or added columns need no code changes.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{AirportData, CloudAmount, SkyCoverError, SkyCoverLevel};

/// Conversion factor from inches of mercury to hectopascals
const HPA_PER_INHG: f64 = 33.86;

/// Structural errors that make a whole feed response unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("feed contains no header line")]
    MissingHeader,
}

type Setter = fn(&mut AirportData, &str);

#[derive(Clone, Copy)]
enum Column {
    Field(Setter),
    /// Both `sky_cover` and `cloud_base_ft_agl` feed the same token list
    SkyCover,
}

macro_rules! text {
    ($field:ident) => {
        (|r: &mut AirportData, v: &str| r.$field = v.to_string()) as Setter
    };
}

/// Float or integer column, zero when the value does not parse
macro_rules! number {
    ($field:ident) => {
        (|r: &mut AirportData, v: &str| r.$field = v.trim().parse().unwrap_or_default()) as Setter
    };
}

fn columns() -> &'static HashMap<&'static str, Column> {
    static COLUMNS: OnceLock<HashMap<&'static str, Column>> = OnceLock::new();

    COLUMNS.get_or_init(|| {
        let fields: Vec<(&'static str, Setter)> = vec![
            ("raw_text", text!(raw_text)),
            ("station_id", text!(station_id)),
            (
                "observation_time",
                (|r: &mut AirportData, v: &str| r.observation_time = parse_timestamp(v)) as Setter,
            ),
            ("latitude", number!(latitude)),
            ("longitude", number!(longitude)),
            ("temp_c", number!(temp_c)),
            ("dewpoint_c", number!(dew_point_c)),
            ("wind_dir_degrees", number!(wind_direction_degrees)),
            ("wind_speed_kt", number!(wind_speed_kts)),
            ("wind_gust_kt", number!(wind_gust_kts)),
            ("visibility_statute_mi", number!(visibility_statute_mi)),
            (
                "altim_in_hg",
                (|r: &mut AirportData, v: &str| {
                    (r.altimeter_hg, r.qnh) = baro_pressure(v).unwrap_or_default();
                }) as Setter,
            ),
            ("sea_level_pressure_hg", text!(sea_level_pressure_hg)),
            ("corrected", text!(corrected)),
            ("auto", text!(auto)),
            ("auto_station", text!(auto_station)),
            ("maintenance_indicator_on", text!(maintenance_indicator_on)),
            ("no_signal", text!(no_signal)),
            ("lightning_sensor_off", text!(lightning_sensor_off)),
            ("freezing_rain_sensor_off", text!(freezing_rain_sensor_off)),
            ("present_weather_sensor_off", text!(present_weather_sensor_off)),
            ("wx_string", text!(wx_string)),
            ("flight_cat", text!(flight_cat)),
            ("three_hr_pressure_tendency_mb", text!(three_hr_pressure_tendency_mb)),
            ("max_temp_c", text!(max_temp_c)),
            ("min_temp_c", text!(min_temp_c)),
            ("max_temp_2_4hr_c", text!(max_temp_24hr_c)),
            ("min_temp_2_4hr_c", text!(min_temp_24hr_c)),
            ("precip_in", text!(precip_in)),
            ("precip_3hr_in", text!(precip_3hr_in)),
            ("precip_6hr_in", text!(precip_6hr_in)),
            ("precip_2_4hr_in", text!(precip_24hr_in)),
            ("snow_in", text!(snow_in)),
            ("vert_vis_ft", text!(vert_vis_ft)),
            ("metar_type", text!(metar_type)),
            ("elevation_m", text!(elevation_m)),
        ];

        fields
            .into_iter()
            .map(|(name, setter)| (name, Column::Field(setter)))
            .chain([
                ("sky_cover", Column::SkyCover),
                ("cloud_base_ft_agl", Column::SkyCover),
            ])
            .collect()
    })
}

/// RFC 3339 timestamp, or the Unix epoch when the value is malformed
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Altimeter setting in inHg and the matching pressure in hPa
fn baro_pressure(value: &str) -> Option<(f64, i64)> {
    let hg: f64 = value.trim().parse().ok()?;
    Some((hg, (HPA_PER_INHG * hg).round() as i64))
}

/// Decode alternating amount/altitude tokens into cloud layers.
///
/// `["FEW", "3000", "OVC", "10000"]` becomes two layers. Any unknown
/// amount, non-numeric altitude or dangling amount fails the whole list.
pub fn decode_sky_cover<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<SkyCoverLevel>, SkyCoverError> {
    tokens
        .chunks(2)
        .map(|pair| -> Result<SkyCoverLevel, SkyCoverError> {
            let code = pair[0].as_ref();
            let amount: CloudAmount = code.parse()?;
            let altitude = pair
                .get(1)
                .ok_or_else(|| SkyCoverError::MissingAltitude(code.to_string()))?
                .as_ref();
            let altitude = altitude
                .trim()
                .parse::<i64>()
                .map_err(|_| SkyCoverError::InvalidAltitude(altitude.to_string()))?;
            Ok(SkyCoverLevel { amount, altitude })
        })
        .collect()
}

/// Parse a full feed response into one record per data line.
///
/// Malformed values fall back to their zero value instead of dropping the
/// record. A record whose sky cover cannot be decoded keeps an empty sky
/// cover list.
pub fn parse_feed(data: &[u8]) -> Result<Vec<AirportData>, ParseError> {
    let text = String::from_utf8_lossy(data);
    let mut schema: Option<Vec<Option<Column>>> = None;
    let mut records = Vec::new();

    for line in text.lines() {
        let tokens: Vec<&str> = line.split(',').collect();
        if tokens.len() < 2 {
            continue;
        }

        if let Some(schema) = &schema {
            records.push(parse_record(schema, &tokens));
        } else {
            let table = columns();
            schema = Some(tokens.iter().map(|name| table.get(*name).copied()).collect());
        }
    }

    if schema.is_none() {
        return Err(ParseError::MissingHeader);
    }

    tracing::debug!("Parsed {} records from feed", records.len());
    Ok(records)
}

fn parse_record(schema: &[Option<Column>], tokens: &[&str]) -> AirportData {
    let mut record = AirportData::default();
    let mut sky_tokens: Vec<&str> = Vec::new();

    for (index, column) in schema.iter().enumerate() {
        let Some(column) = column else {
            continue;
        };
        // Short rows leave their trailing columns blank
        let value = tokens.get(index).copied().unwrap_or_default();

        match column {
            Column::Field(set) => set(&mut record, value),
            Column::SkyCover => {
                if !value.trim().is_empty() {
                    sky_tokens.push(value);
                }
            }
        }
    }

    match decode_sky_cover(&sky_tokens) {
        Ok(levels) => record.sky_cover = levels,
        Err(e) => {
            tracing::debug!(station = %record.station_id, "Dropping sky cover: {}", e);
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[&str] = &[
        "raw_text",
        "station_id",
        "observation_time",
        "latitude",
        "longitude",
        "temp_c",
        "dewpoint_c",
        "wind_dir_degrees",
        "wind_speed_kt",
        "wind_gust_kt",
        "visibility_statute_mi",
        "altim_in_hg",
        "wx_string",
        "sky_cover",
        "cloud_base_ft_agl",
        "sky_cover",
        "cloud_base_ft_agl",
        "flight_cat",
        "elevation_m",
    ];

    const EDDF: &[&str] = &[
        "EDDF 191020Z 24012G22KT 9999 -RA FEW030 OVC100 12/08 Q1013",
        "EDDF",
        "2026-10-19T10:20:00Z",
        "50.05",
        "8.6",
        "12.0",
        "8.0",
        "240",
        "12",
        "22",
        "6.21",
        "29.92",
        "-RA",
        "FEW",
        "3000",
        "OVC",
        "10000",
        "VFR",
        "111",
    ];

    fn feed(header: &[&str], rows: &[Vec<&str>]) -> String {
        let mut out = String::from("No errors\nNo warnings\n4 ms\ndata source=metars\n");
        out.push_str(&format!("{} results\n", rows.len()));
        out.push_str(&header.join(","));
        out.push('\n');
        for row in rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_parse_full_record() {
        let records = parse_feed(feed(HEADER, &[EDDF.to_vec()]).as_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let eddf = &records[0];
        assert_eq!(eddf.station_id, "EDDF");
        assert!(eddf.raw_text.starts_with("EDDF 191020Z"));
        assert_eq!(eddf.observation_time.to_rfc3339(), "2026-10-19T10:20:00+00:00");
        assert_eq!(eddf.latitude, 50.05);
        assert_eq!(eddf.longitude, 8.6);
        assert_eq!(eddf.temp_c, 12.0);
        assert_eq!(eddf.dew_point_c, 8.0);
        assert_eq!(eddf.wind_direction_degrees, 240);
        assert_eq!(eddf.wind_speed_kts, 12);
        assert_eq!(eddf.wind_gust_kts, 22);
        assert_eq!(eddf.visibility_statute_mi, 6.21);
        assert_eq!(eddf.wx_string, "-RA");
        assert_eq!(eddf.flight_cat, "VFR");
        assert_eq!(eddf.elevation_m, "111");
        assert_eq!(
            eddf.sky_cover,
            vec![
                SkyCoverLevel { amount: CloudAmount::Few, altitude: 3000 },
                SkyCoverLevel { amount: CloudAmount::Overcast, altitude: 10000 },
            ]
        );
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let forward = parse_feed(feed(HEADER, &[EDDF.to_vec()]).as_bytes()).unwrap();

        // Reverse the scalar columns but keep each sky_cover/cloud_base pair
        // in reading order, since layer order comes from column order.
        let mut pairs: Vec<(&str, &str)> = HEADER.iter().copied().zip(EDDF.iter().copied()).collect();
        let sky: Vec<(&str, &str)> = pairs
            .iter()
            .copied()
            .filter(|(name, _)| *name == "sky_cover" || *name == "cloud_base_ft_agl")
            .collect();
        pairs.retain(|(name, _)| *name != "sky_cover" && *name != "cloud_base_ft_agl");
        pairs.reverse();
        pairs.extend(sky);

        let header: Vec<&str> = pairs.iter().map(|(name, _)| *name).collect();
        let row: Vec<&str> = pairs.iter().map(|(_, value)| *value).collect();
        let permuted = parse_feed(feed(&header, &[row]).as_bytes()).unwrap();

        assert_eq!(forward, permuted);
    }

    #[test]
    fn test_malformed_number_falls_back_to_zero() {
        let mut row = EDDF.to_vec();
        row[5] = "warm"; // temp_c
        row[8] = "12.5"; // wind_speed_kt is an integer column

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        let eddf = &records[0];
        assert_eq!(eddf.temp_c, 0.0);
        assert_eq!(eddf.wind_speed_kts, 0);
        assert_eq!(eddf.dew_point_c, 8.0);
        assert_eq!(eddf.wind_gust_kts, 22);
        assert_eq!(eddf.station_id, "EDDF");
    }

    #[test]
    fn test_malformed_timestamp_is_epoch() {
        let mut row = EDDF.to_vec();
        row[2] = "yesterday";

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        assert_eq!(records[0].observation_time.timestamp(), 0);
        assert_eq!(records[0].latitude, 50.05);
    }

    #[test]
    fn test_altimeter_derives_qnh() {
        let records = parse_feed(feed(HEADER, &[EDDF.to_vec()]).as_bytes()).unwrap();
        assert_eq!(records[0].altimeter_hg, 29.92);
        assert_eq!(records[0].qnh, 1013);
    }

    #[test]
    fn test_bad_altimeter_zeroes_both_values() {
        let mut row = EDDF.to_vec();
        row[11] = "";

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        assert_eq!(records[0].altimeter_hg, 0.0);
        assert_eq!(records[0].qnh, 0);
    }

    #[test]
    fn test_baro_pressure() {
        assert_eq!(baro_pressure("29.92"), Some((29.92, 1013)));
        assert_eq!(baro_pressure("30.12"), Some((30.12, 1020)));
        assert_eq!(baro_pressure("n/a"), None);
    }

    #[test]
    fn test_decode_sky_cover_pairs() {
        let levels = decode_sky_cover(&["FEW", "3000", "OVC", "10000"]).unwrap();
        assert_eq!(
            levels,
            vec![
                SkyCoverLevel { amount: CloudAmount::Few, altitude: 3000 },
                SkyCoverLevel { amount: CloudAmount::Overcast, altitude: 10000 },
            ]
        );
    }

    #[test]
    fn test_decode_sky_cover_empty() {
        let tokens: [&str; 0] = [];
        assert_eq!(decode_sky_cover(&tokens), Ok(Vec::new()));
    }

    #[test]
    fn test_decode_sky_cover_unknown_amount() {
        assert_eq!(
            decode_sky_cover(&["FEW", "3000", "XXX", "5000"]),
            Err(SkyCoverError::UnknownAmount("XXX".to_string()))
        );
    }

    #[test]
    fn test_decode_sky_cover_bad_altitude() {
        assert_eq!(
            decode_sky_cover(&["BKN", "low"]),
            Err(SkyCoverError::InvalidAltitude("low".to_string()))
        );
    }

    #[test]
    fn test_decode_sky_cover_dangling_amount() {
        assert_eq!(
            decode_sky_cover(&["SCT", "4000", "BKN"]),
            Err(SkyCoverError::MissingAltitude("BKN".to_string()))
        );
    }

    #[test]
    fn test_bad_sky_cover_keeps_record_with_no_layers() {
        let mut row = EDDF.to_vec();
        row[15] = "CLR"; // second sky_cover

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station_id, "EDDF");
        assert!(records[0].sky_cover.is_empty());
    }

    #[test]
    fn test_dangling_amount_in_row_drops_all_layers() {
        let mut row = EDDF.to_vec();
        row[13] = "SCT";
        row[14] = "4000";
        row[15] = "BKN";
        row[16] = "";

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station_id, "EDDF");
        // No partial list: the decoded SCT layer is dropped with the bad BKN
        assert!(records[0].sky_cover.is_empty());
    }

    #[test]
    fn test_blank_sky_cover_columns_are_skipped() {
        let mut row = EDDF.to_vec();
        row[15] = "";
        row[16] = "";

        let records = parse_feed(feed(HEADER, &[row]).as_bytes()).unwrap();
        assert_eq!(
            records[0].sky_cover,
            vec![SkyCoverLevel { amount: CloudAmount::Few, altitude: 3000 }]
        );
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let text = "station_id,visibility_km,temp_c\nKJFK,10,21.5\n";
        let records = parse_feed(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station_id, "KJFK");
        assert_eq!(records[0].temp_c, 21.5);
    }

    #[test]
    fn test_records_keep_input_order() {
        let text = "station_id,temp_c\nKJFK,21\nEDDF,12\nKJFK,22\n";
        let ids: Vec<String> = parse_feed(text.as_bytes())
            .unwrap()
            .into_iter()
            .map(|r| r.station_id)
            .collect();
        assert_eq!(ids, vec!["KJFK", "EDDF", "KJFK"]);
    }

    #[test]
    fn test_short_rows_and_crlf() {
        let text = "station_id,temp_c,dewpoint_c\r\nEGLL,9.0\r\n";
        let records = parse_feed(text.as_bytes()).unwrap();
        assert_eq!(records[0].station_id, "EGLL");
        assert_eq!(records[0].temp_c, 9.0);
        assert_eq!(records[0].dew_point_c, 0.0);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_rejected() {
        let records = parse_feed(b"station_id,temp_c\nK\xffJF,21.5\n").unwrap();
        assert_eq!(records[0].station_id, "K\u{FFFD}JF");
        assert_eq!(records[0].temp_c, 21.5);
    }

    #[test]
    fn test_extra_trailing_tokens_are_ignored() {
        let text = "station_id,temp_c\nKJFK,21.5,extra,more\nEDDF,12.0\n";
        let records = parse_feed(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].station_id, "KJFK");
        assert_eq!(records[0].temp_c, 21.5);
        assert_eq!(records[1].station_id, "EDDF");
    }

    #[test]
    fn test_numeric_values_are_trimmed() {
        let text = "station_id,temp_c,wind_speed_kt,altim_in_hg\nKJFK, 21.5 , 7 , 29.92\n";
        let records = parse_feed(text.as_bytes()).unwrap();
        assert_eq!(records[0].temp_c, 21.5);
        assert_eq!(records[0].wind_speed_kts, 7);
        assert_eq!(records[0].qnh, 1013);
    }

    #[test]
    fn test_missing_header_is_error() {
        assert_eq!(parse_feed(b""), Err(ParseError::MissingHeader));
        assert_eq!(
            parse_feed(b"<html>\n<body>Service Unavailable</body>\n</html>\n"),
            Err(ParseError::MissingHeader)
        );
    }

    #[test]
    fn test_header_only_is_empty_batch() {
        let records = parse_feed(b"raw_text,station_id\n").unwrap();
        assert!(records.is_empty());
    }
}
