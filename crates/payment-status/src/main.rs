use anyhow::anyhow;
use clap::Parser;
use log::error;
use payment_status::{
    get_payment, get_settings, setup_logger, Cli, LnClient, PaymentQuery, PaymentTracker,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = get_settings(&cli)?;
    setup_logger(
        settings.level.clone(),
        vec![String::from("hyper"), String::from("reqwest")],
    )?;

    let ln: Arc<dyn PaymentTracker> = Arc::new(LnClient::new(settings.ln_settings).await?);
    let query = PaymentQuery {
        id: cli.payment_hash,
        session: Some(ln),
    };

    match get_payment(query).await {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Err(e) => {
            error!("Failed to get payment: {}", e);
            let rejection = json!({
                "status": e.status_code(),
                "code": e.code(),
                "details": e.details(),
            });
            println!("{}", serde_json::to_string_pretty(&rejection)?);
            Err(anyhow!("{} {}", e.status_code(), e.code()))
        }
    }
}
