use std::io;

use common::{config::Config, s3::ConfiguredClient};

use crate::{
    commands::Upload,
    transfer::{self, ConsoleProgress, TransferError, TransferRequest},
};

/// Single file upload entrypoint.
///
/// The local file is validated before any storage request is made.
pub(crate) async fn upload(
    Upload {
        file,
        bucket,
        key,
        region,
    }: Upload,
    config: &Config,
) -> Result<(), TransferError> {
    let request = TransferRequest::upload(file, bucket, key)?;

    let region = region.unwrap_or_else(|| config.storage.region.clone());
    let client = ConfiguredClient::new(&config.storage, &region).await;

    transfer::upload(&client, &request, &mut io::stdout(), ConsoleProgress::new).await?;

    Ok(())
}
