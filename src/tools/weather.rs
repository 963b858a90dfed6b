//! 天气工具：Open-Meteo 地理编码 + 当前天气（免费，无需 API Key）
//!
//! 城市名含逗号时（如 "Paris, France"）先试完整名称，再试逗号前部分。
//! 城市找不到或上游 HTTP 失败都以 `{"error": ..., "city": ...}` 的形式作为结果返回，不视为工具异常。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::WeatherSection;
use crate::tools::{ParamSpec, Tool};

/// WMO 天气代码 → 描述
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 => "foggy",
        48 => "depositing rime fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "dense drizzle",
        61 => "slight rain",
        63 => "moderate rain",
        65 => "heavy rain",
        71 => "slight snow",
        73 => "moderate snow",
        75 => "heavy snow",
        77 => "snow grains",
        80 => "slight rain showers",
        81 => "moderate rain showers",
        82 => "violent rain showers",
        85 => "slight snow showers",
        86 => "heavy snow showers",
        95 => "thunderstorm",
        96 => "thunderstorm with slight hail",
        99 => "thunderstorm with heavy hail",
        _ => "unknown",
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodingHit {
    latitude: f64,
    longitude: f64,
    name: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: CurrentConditions,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentConditions {
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<Value>,
    weather_code: Option<i64>,
    wind_speed_10m: Option<f64>,
}

impl CurrentConditions {
    /// 格式化为返回给 LLM 的天气摘要（华氏度 / mph）
    fn summarize(&self, city: &str, country: &str) -> Value {
        let humidity = match &self.relative_humidity_2m {
            Some(Value::Number(n)) => n.to_string(),
            _ => "0".to_string(),
        };
        json!({
            "city": city,
            "country": country,
            "temp": format!("{:.0}°F", self.temperature_2m.unwrap_or(0.0)),
            "feels_like": format!("{:.0}°F", self.apparent_temperature.unwrap_or(0.0)),
            "humidity": format!("{}%", humidity),
            "conditions": describe_weather_code(self.weather_code.unwrap_or(0)),
            "wind_speed": format!("{:.1} mph", self.wind_speed_10m.unwrap_or(0.0)),
        })
    }
}

/// 依次尝试的地理编码查询：完整名称，以及（含逗号时）逗号前部分
fn geocoding_queries(city: &str) -> Vec<String> {
    let mut queries = vec![city.to_string()];
    if let Some((head, _)) = city.split_once(',') {
        let head = head.trim();
        if !head.is_empty() {
            queries.push(head.to_string());
        }
    }
    queries
}

/// 天气工具：get_weather(city)
pub struct WeatherTool {
    client: Client,
    geocoding_url: String,
    forecast_url: String,
}

impl WeatherTool {
    pub fn new(cfg: &WeatherSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("weather http client build failed ({}), using defaults", e);
                Client::new()
            });
        Self {
            client,
            geocoding_url: cfg.geocoding_url.clone(),
            forecast_url: cfg.forecast_url.clone(),
        }
    }

    async fn coordinates(&self, city: &str) -> Option<GeocodingHit> {
        for query in geocoding_queries(city) {
            let response = self
                .client
                .get(&self.geocoding_url)
                .query(&[
                    ("name", query.as_str()),
                    ("count", "5"),
                    ("language", "en"),
                    ("format", "json"),
                ])
                .send()
                .await
                .and_then(|r| r.error_for_status());
            let parsed = match response {
                Ok(r) => r.json::<GeocodingResponse>().await,
                Err(e) => {
                    tracing::debug!(query = %query, "geocoding failed: {}", e);
                    continue;
                }
            };
            if let Ok(GeocodingResponse { results }) = parsed {
                if let Some(hit) = results.into_iter().next() {
                    return Some(hit);
                }
            }
        }
        None
    }

    async fn current(&self, hit: &GeocodingHit) -> Result<CurrentConditions, String> {
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", hit.latitude.to_string()),
                ("longitude", hit.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m"
                        .to_string(),
                ),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("API error: {}", status.as_u16()));
        }
        response
            .json::<ForecastResponse>()
            .await
            .map(|r| r.current)
            .map_err(|e| format!("Unexpected error: {}", e))
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather (temperature, conditions, humidity, wind) for a city"
    }

    fn input_schema(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([(
            "city".to_string(),
            ParamSpec::required("string", "The name of the city to get weather for"),
        )])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let city = args
            .get("city")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "missing required argument: city".to_string())?;

        let Some(hit) = self.coordinates(city).await else {
            return Ok(json!({"error": format!("City '{}' not found", city), "city": city}));
        };
        let name = hit.name.clone().unwrap_or_else(|| city.to_string());
        let country = hit.country.clone().unwrap_or_default();

        match self.current(&hit).await {
            Ok(current) => Ok(current.summarize(&name, &country)),
            Err(e) => Ok(json!({"error": e, "city": city})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_codes() {
        assert_eq!(describe_weather_code(0), "clear sky");
        assert_eq!(describe_weather_code(63), "moderate rain");
        assert_eq!(describe_weather_code(42), "unknown");
    }

    #[test]
    fn test_geocoding_queries_split_on_comma() {
        assert_eq!(geocoding_queries("Paris"), vec!["Paris"]);
        assert_eq!(geocoding_queries("Paris, France"), vec!["Paris, France", "Paris"]);
    }

    #[test]
    fn test_summarize_formats_units() {
        let current: CurrentConditions = serde_json::from_value(json!({
            "temperature_2m": 61.4,
            "apparent_temperature": 59.6,
            "relative_humidity_2m": 72,
            "weather_code": 3,
            "wind_speed_10m": 8.3
        }))
        .unwrap();
        let summary = current.summarize("Paris", "France");
        assert_eq!(summary["temp"], "61°F");
        assert_eq!(summary["feels_like"], "60°F");
        assert_eq!(summary["humidity"], "72%");
        assert_eq!(summary["conditions"], "overcast");
        assert_eq!(summary["wind_speed"], "8.3 mph");
    }

    #[tokio::test]
    async fn test_missing_city_is_an_error() {
        let tool = WeatherTool::new(&WeatherSection::default());
        assert!(tool.execute(Map::new()).await.is_err());
    }
}
