//! Run one USER REQUESTED cycle against the configured sources and print the report
//! followed by the current alert feed (JSON).

use market_impact_alerts::{
    build_coordinator, init_tracing, InferenceConfig, PipelineConfig, Provenance, TriggerOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let ai = InferenceConfig::load_default()?;
    let coordinator = build_coordinator(&cfg, &ai)?;

    match coordinator.trigger(Provenance::UserRequested).await {
        TriggerOutcome::Accepted(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        TriggerOutcome::Busy => println!("{{\"status\":\"busy\"}}"),
    }
    println!("{}", serde_json::to_string_pretty(coordinator.alerts().as_ref())?);
    Ok(())
}
