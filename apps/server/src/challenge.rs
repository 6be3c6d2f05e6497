//! Interactive answer to the cloud service's verification challenge.

use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use framesync_cloud::ChallengeResolver;
use framesync_core::Error;

/// Prompts on stderr and reads one line from stdin.
pub fn stdin_resolver() -> ChallengeResolver {
    Arc::new(|| {
        async {
            let mut stderr = tokio::io::stderr();
            stderr
                .write_all(b"Enter the verification code: ")
                .await
                .map_err(|e| Error::authentication(format!("prompt failed: {}", e)))?;
            stderr.flush().await.ok();

            let mut line = String::new();
            let read = BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .map_err(|e| Error::authentication(format!("reading code failed: {}", e)))?;
            if read == 0 {
                return Err(Error::authentication("stdin closed before a code was entered"));
            }
            Ok(line.trim().to_string())
        }
        .boxed()
    })
}
