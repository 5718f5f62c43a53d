//! `surveyor insights <survey-id>`: one-shot insights without starting the
//! HTTP server.

use std::sync::Arc;

use anyhow::Context;

use sv_domain::config::Config;

use crate::bootstrap;
use crate::runtime::insights;

pub async fn run(config: Arc<Config>, survey_id: String, force: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let view = insights::get(&state, &survey_id, force)
        .await
        .with_context(|| format!("insights for survey {survey_id}"))?;

    let json = serde_json::to_string_pretty(&view).context("serializing insights")?;
    println!("{json}");
    Ok(())
}
