//! Drive the recharge wizard until the order settles

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};
use uuid::Uuid;

use sonar_core::{OperationId, PayMethod, RechargeController, RechargeStep};

use crate::api::ApiClient;
use crate::config::CliConfig;

pub async fn run(
    client: ApiClient,
    config: &CliConfig,
    amount_cents: u64,
    method: PayMethod,
) -> Result<()> {
    if amount_cents == 0 {
        bail!("amount must be positive");
    }

    let controller = RechargeController::new(Arc::new(client.clone()), config.poll.clone());
    controller.select_amount(amount_cents)?;
    controller.select_method(method)?;

    let request_id = Uuid::new_v4().to_string();
    info!(
        "Creating {} order for {} cents (request {})",
        method.as_str(),
        amount_cents,
        request_id
    );
    let order = match client
        .create_order(amount_cents, method.as_str(), &request_id)
        .await
    {
        Ok(order) => order,
        Err(e) => {
            controller.order_failed(e.to_string());
            return Err(e);
        }
    };

    if let Some(qr) = &order.qr_url {
        println!("Scan to pay: {qr}");
    }
    println!("Order {} created, waiting for payment...", order.order_id);
    controller.order_created(OperationId::new(order.order_id))?;

    // Ctrl-C backs out of the wizard and stops the poll session
    let controller = Arc::new(controller);
    let watcher = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.reset();
        }
    });

    let mut steps = controller.subscribe();
    let mut scanned_notified = false;
    let mut last_error_seen: Option<String> = None;
    loop {
        if controller.scanned() && !scanned_notified {
            scanned_notified = true;
            println!("QR code scanned, waiting for confirmation...");
        }
        let error = controller.last_transport_error();
        if error != last_error_seen {
            if let Some(message) = &error {
                warn!("Status check failed, still retrying: {}", message);
            }
            last_error_seen = error;
        }

        match controller.step() {
            RechargeStep::Succeeded => {
                println!("Payment confirmed.");
                return Ok(());
            }
            RechargeStep::Failed { reason } => bail!("recharge failed: {reason}"),
            RechargeStep::SelectAmount => bail!("recharge cancelled"),
            _ => {}
        }

        // Wake on step changes, or once a second for the scanned/error notices
        tokio::select! {
            changed = steps.changed() => changed?,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}
