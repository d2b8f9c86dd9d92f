use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::gate::ConcurrencyGate;
use crate::llm::media::MediaFile;
use crate::llm::{ImageGenerationError, INVALID_CREDENTIAL_SIGNATURE};
use crate::prompt::AssembledRequest;

pub const MAX_BATCH_SIZE: usize = 4;

/// One dispatchable generation call derived from the batch template. The
/// image set is shared; only the text differs between variations.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub text: String,
    pub images: Arc<Vec<MediaFile>>,
    pub aspect_ratio: &'static str,
}

#[derive(Debug, Clone)]
pub struct GeneratedResult {
    pub bytes: Vec<u8>,
    pub prompt: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successes: Vec<GeneratedResult>,
    pub failure_count: usize,
    pub first_failure: Option<String>,
    pub credential_invalid: bool,
}

impl BatchOutcome {
    fn record_failure(&mut self, message: String) {
        self.failure_count += 1;
        if message.contains(INVALID_CREDENTIAL_SIGNATURE) {
            self.credential_invalid = true;
        }
        if self.first_failure.is_none() {
            self.first_failure = Some(message);
        }
    }

    pub fn settled(&self) -> usize {
        self.successes.len() + self.failure_count
    }

    /// The secondary warning shown alongside whatever successes survived.
    pub fn user_facing_error(&self) -> Option<String> {
        let first = self.first_failure.as_deref()?;
        if self.credential_invalid {
            Some(
                "Generation API key looks invalid or expired; please update it and try again."
                    .to_string(),
            )
        } else {
            Some(format!(
                "{} generation request(s) failed: {}",
                self.failure_count, first
            ))
        }
    }
}

fn variation_text(base: &str, index: usize, batch_size: usize) -> String {
    if batch_size > 1 {
        format!(
            "{} Variation {}: slightly vary lighting details",
            base,
            index + 1
        )
    } else {
        base.to_string()
    }
}

/// Dispatches `batch_size` independent generation calls and waits for every
/// one of them to settle; a failure never cancels its siblings. The gate
/// permit spans the whole batch and is released once, when all calls have
/// settled.
pub async fn run_batch<F, Fut>(
    request: &AssembledRequest,
    batch_size: usize,
    gate: &Arc<ConcurrencyGate>,
    dispatch: F,
) -> BatchOutcome
where
    F: Fn(GenerationCall) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, ImageGenerationError>> + Send + 'static,
{
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let _permit = gate.start();

    let images = Arc::new(request.images.clone());
    let mut handles = Vec::with_capacity(batch_size);
    for index in 0..batch_size {
        let text = variation_text(&request.text, index, batch_size);
        let call = GenerationCall {
            text: text.clone(),
            images: Arc::clone(&images),
            aspect_ratio: request.aspect_ratio,
        };
        handles.push((text, tokio::spawn(dispatch(call))));
    }

    let mut outcome = BatchOutcome::default();
    for (prompt, handle) in handles {
        match handle.await {
            Ok(Ok(bytes)) => outcome.successes.push(GeneratedResult { bytes, prompt }),
            Ok(Err(err)) => outcome.record_failure(err.0),
            Err(err) => outcome.record_failure(format!("generation task aborted: {err}")),
        }
    }

    if outcome.failure_count > 0 {
        warn!(
            "Generation batch settled {} call(s): {} success(es), {} failure(s); first failure: {:?}",
            outcome.settled(),
            outcome.successes.len(),
            outcome.failure_count,
            outcome.first_failure
        );
    } else {
        info!(
            "Generation batch settled {} call(s), all successful",
            outcome.settled()
        );
    }

    outcome
}
