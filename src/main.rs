use anyhow::Context;
use keyset_config::{telemetry::init_tracing, ActionsMasker, EnvInputs, LocalFileSource, Settings};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_source(&EnvInputs).context("failed to read inputs")?;

    let masker = ActionsMasker;
    settings.credentials().register_secrets(&masker);
    if !settings.credentials().is_complete() {
        tracing::debug!("tenant credentials not fully configured");
    }

    let uploads = settings
        .prepare_uploads(&LocalFileSource, &masker)
        .await
        .context("policy keys are not valid")?;

    for upload in &uploads {
        let line = json!({
            "keySet": upload.key_set_id,
            "endpoint": upload.endpoint,
            "fields": upload.wire_names(),
        });
        println!("{line}");
    }

    tracing::info!(keys = uploads.len(), "policy key uploads prepared");
    Ok(())
}
