use std::io;

use common::{config::Config, s3::ConfiguredClient};
use tracing::debug;

use crate::{
    commands::Download,
    prompt::TerminalPrompt,
    transfer::{self, ConsoleProgress, TransferError, TransferRequest},
};

/// Single file download entrypoint.
pub(crate) async fn download(
    Download {
        bucket,
        key,
        output,
        region,
    }: Download,
    config: &Config,
) -> Result<(), TransferError> {
    let request = TransferRequest::download(bucket, key, output)?;

    let region = region.unwrap_or_else(|| config.storage.region.clone());
    let client = ConfiguredClient::new(&config.storage, &region).await;

    let outcome = transfer::download(
        &client,
        &request,
        &TerminalPrompt,
        &mut io::stdout(),
        ConsoleProgress::new,
    )
    .await?;

    debug!(?outcome, "download finished");

    Ok(())
}
