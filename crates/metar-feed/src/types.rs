use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coverage class of a reported cloud layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudAmount {
    Few,
    Scattered,
    Broken,
    Overcast,
}

impl CloudAmount {
    /// Three-letter METAR code for this amount
    pub fn code(&self) -> &'static str {
        match self {
            Self::Few => "FEW",
            Self::Scattered => "SCT",
            Self::Broken => "BKN",
            Self::Overcast => "OVC",
        }
    }
}

impl FromStr for CloudAmount {
    type Err = SkyCoverError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "FEW" => Ok(Self::Few),
            "SCT" => Ok(Self::Scattered),
            "BKN" => Ok(Self::Broken),
            "OVC" => Ok(Self::Overcast),
            other => Err(SkyCoverError::UnknownAmount(other.to_string())),
        }
    }
}

impl fmt::Display for CloudAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single cloud layer as reported by a METAR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkyCoverLevel {
    pub amount: CloudAmount,
    /// Cloud base, feet above ground level
    pub altitude: i64,
}

/// Latest observation for one station.
///
/// The long tail of rarely populated columns is kept as the raw text the
/// feed delivered; an absent value is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirportData {
    pub raw_text: String,
    pub station_id: String,
    pub observation_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub temp_c: f64,
    pub dew_point_c: f64,
    pub wind_direction_degrees: i64,
    pub wind_speed_kts: i64,
    pub wind_gust_kts: i64,
    pub visibility_statute_mi: f64,
    pub altimeter_hg: f64,
    /// Pressure in hPa derived from the altimeter setting
    pub qnh: i64,
    pub sea_level_pressure_hg: String,
    pub corrected: String,
    pub auto: String,
    pub auto_station: String,
    pub maintenance_indicator_on: String,
    pub no_signal: String,
    pub lightning_sensor_off: String,
    pub freezing_rain_sensor_off: String,
    pub present_weather_sensor_off: String,
    pub wx_string: String,
    pub flight_cat: String,
    pub three_hr_pressure_tendency_mb: String,
    pub max_temp_c: String,
    pub min_temp_c: String,
    pub max_temp_24hr_c: String,
    pub min_temp_24hr_c: String,
    pub precip_in: String,
    pub precip_3hr_in: String,
    pub precip_6hr_in: String,
    pub precip_24hr_in: String,
    pub snow_in: String,
    pub vert_vis_ft: String,
    pub metar_type: String,
    pub elevation_m: String,
    pub sky_cover: Vec<SkyCoverLevel>,
}

/// Sky cover decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkyCoverError {
    #[error("invalid sky cover string \"{0}\"")]
    UnknownAmount(String),
    #[error("invalid cloud level string \"{0}\"")]
    InvalidAltitude(String),
    #[error("sky cover \"{0}\" has no cloud base")]
    MissingAltitude(String),
}
