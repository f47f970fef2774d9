use std::env;
use std::sync::Arc;
use toolgate::ToolSet;
use toolgate_weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let city = env::args().nth(1).unwrap_or_else(|| "Berlin".to_string());

    let client = Arc::new(WeatherClient::new(reqwest::Client::new())?);
    let set = ToolSet::new().with(toolgate_weather::tools(client));

    let outcome = set
        .invoke("current_weather", &serde_json::json!({"city": city}))
        .await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
