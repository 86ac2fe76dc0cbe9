//! Upload orchestration: validation, copy-with-progress, persistence.
//!
//! For each part the pipeline moves through
//! `Started -> Sniffing -> {SizeRejected | TypeRejected | Streaming} ->
//! {Persisted | IoFailed}`. Per-part failures are recovered locally - the
//! remaining bytes of a rejected part are drained so boundary framing stays
//! intact and the next part is unaffected. Only request-level failures
//! (transport read errors, broken framing) abort the run.

use bytes::BytesMut;
use futures::Stream;
use tracing::{error, info, warn};

use crate::config::UploadsConfig;
use crate::errors::Result;
use crate::limits::SizeGuard;
use crate::multipart::{Multipart, Part};
use crate::progress::ProgressTracker;
use crate::sniff;
use crate::storage::UploadStore;

/// Terminal state of one part.
#[derive(Debug)]
pub enum PartOutcome {
    /// Validated, streamed to storage, committed.
    Persisted {
        field: String,
        file_name: String,
        stored_name: String,
        bytes_written: u64,
    },
    /// Declared or observed size exceeded the configured maximum. Zero bytes
    /// reached storage.
    SizeRejected { field: String, file_name: String },
    /// Sniffed content type is outside the allow-list. Zero bytes reached
    /// storage.
    TypeRejected {
        field: String,
        file_name: String,
        detected: &'static str,
    },
    /// Writing this part's destination file failed; sibling parts continue.
    IoFailed { field: String, file_name: String },
}

impl PartOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, PartOutcome::Persisted { .. })
    }

    /// One line of the plain-text response summary. Rejection reasons are
    /// category descriptions, never internal error text.
    pub fn summary_line(&self) -> String {
        match self {
            PartOutcome::Persisted {
                file_name,
                stored_name,
                bytes_written,
                ..
            } => {
                format!("{}: accepted, stored as {} ({} bytes)", display_name(file_name), stored_name, bytes_written)
            }
            PartOutcome::SizeRejected { file_name, .. } => {
                format!("{}: rejected: size exceeded", display_name(file_name))
            }
            PartOutcome::TypeRejected { file_name, .. } => {
                format!("{}: rejected: unsupported type", display_name(file_name))
            }
            PartOutcome::IoFailed { file_name, .. } => {
                format!("{}: failed: storage error", display_name(file_name))
            }
        }
    }
}

fn display_name(file_name: &str) -> &str {
    if file_name.is_empty() { "(unnamed part)" } else { file_name }
}

/// Streams validated parts of one request into storage.
pub struct UploadPipeline<'a> {
    policy: &'a UploadsConfig,
    store: &'a UploadStore,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(policy: &'a UploadsConfig, store: &'a UploadStore) -> Self {
        Self { policy, store }
    }

    /// Process every part in stream order, producing exactly one outcome per
    /// part. An `Err` here is request-fatal (transport failure or broken
    /// framing); outcomes already produced remain valid and their files stay
    /// on disk.
    pub async fn run<S>(&self, multipart: &mut Multipart<S>) -> Result<Vec<PartOutcome>>
    where
        S: Stream<Item = std::result::Result<bytes::Bytes, axum::Error>> + Unpin,
    {
        let mut outcomes = Vec::new();
        while let Some(mut part) = multipart.next_part().await? {
            let outcome = self.process_part(&mut part).await?;
            info!(
                field = outcome_field(&outcome),
                file_name = outcome_file_name(&outcome),
                outcome = outcome_label(&outcome),
                "part processed"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn process_part<S>(&self, part: &mut Part<'_, S>) -> Result<PartOutcome>
    where
        S: Stream<Item = std::result::Result<bytes::Bytes, axum::Error>> + Unpin,
    {
        let field = part.name().to_string();
        let file_name = part.file_name().to_string();
        let mut guard = SizeGuard::new(self.policy.max_upload_size);

        // Upfront rejection when the transport declares the size.
        if let Some(declared) = part.content_length() {
            if !guard.precheck(declared) {
                warn!(
                    field,
                    file_name,
                    declared,
                    limit = self.policy.max_upload_size,
                    "part rejected: declared size exceeds limit"
                );
                drain(part).await?;
                return Ok(PartOutcome::SizeRejected { field, file_name });
            }
        }

        // Sniffing: collect the classification window. The part stream is
        // forward-only, so these bytes are buffered and replayed ahead of
        // the remaining payload once the part is accepted.
        let mut peek = BytesMut::new();
        let mut part_done = false;
        while peek.len() < sniff::SNIFF_LEN {
            match part.chunk().await? {
                Some(chunk) => {
                    if !guard.observe(chunk.len()) {
                        warn!(
                            field,
                            file_name,
                            byte_offset = guard.seen(),
                            limit = self.policy.max_upload_size,
                            "part rejected: size limit exceeded while sniffing"
                        );
                        drain(part).await?;
                        return Ok(PartOutcome::SizeRejected { field, file_name });
                    }
                    peek.extend_from_slice(&chunk);
                }
                None => {
                    part_done = true;
                    break;
                }
            }
        }

        let detected = sniff::classify(&peek[..peek.len().min(sniff::SNIFF_LEN)]);
        if !self.policy.is_allowed(detected) {
            warn!(
                field,
                file_name,
                detected,
                declared = part.content_type().unwrap_or("(none)"),
                "part rejected: sniffed type not allowed"
            );
            drain(part).await?;
            return Ok(PartOutcome::TypeRejected { field, file_name, detected });
        }

        // Streaming: replay the peeked bytes, then copy the rest.
        let mut progress = ProgressTracker::new(&file_name, part.content_length());
        let mut pending = match self.store.create(&file_name).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(field, file_name, error = %e, "failed to create destination file");
                drain(part).await?;
                return Ok(PartOutcome::IoFailed { field, file_name });
            }
        };

        if let Err(e) = pending.write(&peek).await {
            error!(field, file_name, byte_offset = 0u64, error = %e, "write failed");
            pending.discard().await;
            drain(part).await?;
            return Ok(PartOutcome::IoFailed { field, file_name });
        }
        progress.observe(peek.len());

        if !part_done {
            loop {
                let chunk = match part.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        // Transport or framing failure is request-fatal; the
                        // in-progress file must not be left behind.
                        pending.discard().await;
                        return Err(e);
                    }
                };

                if !guard.observe(chunk.len()) {
                    warn!(
                        field,
                        file_name,
                        byte_offset = guard.seen(),
                        limit = self.policy.max_upload_size,
                        "part rejected: size limit exceeded mid-stream"
                    );
                    pending.discard().await;
                    drain(part).await?;
                    return Ok(PartOutcome::SizeRejected { field, file_name });
                }

                if let Err(e) = pending.write(&chunk).await {
                    error!(field, file_name, byte_offset = guard.seen(), error = %e, "write failed");
                    pending.discard().await;
                    drain(part).await?;
                    return Ok(PartOutcome::IoFailed { field, file_name });
                }
                progress.observe(chunk.len());
            }
        }

        match pending.persist().await {
            Ok(stored_name) => {
                let bytes_written = progress.bytes_read();
                progress.finish();
                Ok(PartOutcome::Persisted {
                    field,
                    file_name,
                    stored_name,
                    bytes_written,
                })
            }
            Err(e) => {
                error!(field, file_name, error = %e, "failed to persist destination file");
                Ok(PartOutcome::IoFailed { field, file_name })
            }
        }
    }
}

/// Read and discard the remaining payload of a rejected part so the parser
/// can advance to the next boundary.
async fn drain<S>(part: &mut Part<'_, S>) -> Result<u64>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, axum::Error>> + Unpin,
{
    let mut discarded = 0u64;
    while let Some(chunk) = part.chunk().await? {
        discarded += chunk.len() as u64;
    }
    Ok(discarded)
}

fn outcome_field(outcome: &PartOutcome) -> &str {
    match outcome {
        PartOutcome::Persisted { field, .. }
        | PartOutcome::SizeRejected { field, .. }
        | PartOutcome::TypeRejected { field, .. }
        | PartOutcome::IoFailed { field, .. } => field,
    }
}

fn outcome_file_name(outcome: &PartOutcome) -> &str {
    match outcome {
        PartOutcome::Persisted { file_name, .. }
        | PartOutcome::SizeRejected { file_name, .. }
        | PartOutcome::TypeRejected { file_name, .. }
        | PartOutcome::IoFailed { file_name, .. } => file_name,
    }
}

fn outcome_label(outcome: &PartOutcome) -> &'static str {
    match outcome {
        PartOutcome::Persisted { .. } => "persisted",
        PartOutcome::SizeRejected { .. } => "size_rejected",
        PartOutcome::TypeRejected { .. } => "type_rejected",
        PartOutcome::IoFailed { .. } => "io_failed",
    }
}
