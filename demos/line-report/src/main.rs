use serde_json::json;
use std::env;
use toolgate::core::ToolOutcome;

/// Logs in with `PLANT_USERNAME`/`PLANT_PASSWORD`, then runs the previous-day
/// performance analysis for the line given on the command line.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let line_id = env::args()
        .nth(1)
        .ok_or("usage: line-report <line-id>")?;

    let set = toolgate::standard_set(reqwest::Client::new())?;

    let login = set.invoke("plant_login", &json!({})).await;
    let token = match &login {
        ToolOutcome::Success(reply) => reply.data["token"]
            .as_str()
            .ok_or("login reply carried no token")?
            .to_string(),
        ToolOutcome::Failure(failure) => return Err(failure.to_string().into()),
    };

    let outcome = set
        .invoke(
            "line_performance",
            &json!({"token": token, "line_id": line_id}),
        )
        .await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
