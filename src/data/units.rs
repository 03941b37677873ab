//! Unit conversions and variable naming for gridded model output

/// Offset between the Kelvin and Celsius scales
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

pub fn pascal_to_hectopascal(pascal: f64) -> f64 {
    pascal / 100.0
}

pub fn meters_to_millimeters(meters: f64) -> f64 {
    meters * 1000.0
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Surface variables extracted from the forecast grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridVariable {
    /// 2 m temperature, K
    Temperature,
    /// 2 m relative humidity, %
    Humidity,
    /// 10 m U wind component, m/s
    WindU,
    /// 10 m V wind component, m/s
    WindV,
    /// Mean sea-level pressure, Pa
    Pressure,
    /// Total cloud cover
    Clouds,
    /// Total precipitation, m
    Precipitation,
}

impl GridVariable {
    /// All variables in table column order
    pub const ALL: [GridVariable; 7] = [
        GridVariable::Temperature,
        GridVariable::Humidity,
        GridVariable::WindU,
        GridVariable::WindV,
        GridVariable::Pressure,
        GridVariable::Clouds,
        GridVariable::Precipitation,
    ];

    /// Look up a variable by its GRIB short name
    pub fn from_short_name(short_name: &str) -> Option<Self> {
        match short_name {
            "t2m" => Some(GridVariable::Temperature),
            "r2" => Some(GridVariable::Humidity),
            "u10" => Some(GridVariable::WindU),
            "v10" => Some(GridVariable::WindV),
            "prmsl" => Some(GridVariable::Pressure),
            "tcc" => Some(GridVariable::Clouds),
            "tp" => Some(GridVariable::Precipitation),
            _ => None,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            GridVariable::Temperature => "t2m",
            GridVariable::Humidity => "r2",
            GridVariable::WindU => "u10",
            GridVariable::WindV => "v10",
            GridVariable::Pressure => "prmsl",
            GridVariable::Clouds => "tcc",
            GridVariable::Precipitation => "tp",
        }
    }

    /// Column name used in observation tables
    pub fn column_name(&self) -> &'static str {
        match self {
            GridVariable::Temperature => "temperature",
            GridVariable::Humidity => "humidity",
            GridVariable::WindU => "wind_u",
            GridVariable::WindV => "wind_v",
            GridVariable::Pressure => "pressure",
            GridVariable::Clouds => "clouds",
            GridVariable::Precipitation => "precipitation",
        }
    }

    /// Convert a raw grid value into table units (°C, hPa, mm)
    pub fn to_table_units(&self, raw: f64) -> f64 {
        match self {
            GridVariable::Temperature => kelvin_to_celsius(raw),
            GridVariable::Pressure => pascal_to_hectopascal(raw),
            GridVariable::Precipitation => meters_to_millimeters(raw),
            _ => raw,
        }
    }
}
