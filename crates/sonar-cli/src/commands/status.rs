//! One-shot order status lookup

use anyhow::Result;

use sonar_core::{OperationId, StatusSource};

use crate::api::ApiClient;

pub async fn run(client: ApiClient, order_id: String) -> Result<()> {
    let id = OperationId::new(order_id);
    let report = client.fetch(&id).await?;
    match report.detail {
        Some(detail) => println!("{}: {} ({})", id, report.state, detail),
        None => println!("{}: {}", id, report.state),
    }
    Ok(())
}
