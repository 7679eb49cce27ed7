//! Background processing of provider recordings
//!
//! The recording-available webhook only enqueues a job. The worker downloads
//! the media, stores it, optionally transcribes it, records a CallRecording
//! row and deletes the provider's copy. Failed jobs are re-enqueued with a
//! growing delay until the attempt limit is reached.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::storage::{RecordingStorage, StorageError};
use super::store::{Store, StoreError};
use super::telephony::{TelephonyError, TelephonyProvider};
use super::transcription::{Transcriber, TranscriptionError};
use crate::models::{CallRecording, NewCallRecording};

#[derive(Error, Debug)]
pub enum RecordingJobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Telephony error: {0}")]
    Telephony(#[from] TelephonyError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingJob {
    pub call_sid: String,
    pub recording_sid: String,
    pub recording_url: String,
    pub duration_seconds: i32,
    /// Zero-based attempt number
    pub attempt: u32,
}

#[derive(Debug)]
pub enum JobOutcome {
    Stored(CallRecording),
    AlreadyStored,
    UnknownCall,
}

#[derive(Clone)]
pub struct RecordingQueue {
    tx: mpsc::UnboundedSender<RecordingJob>,
}

impl RecordingQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RecordingJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: RecordingJob) -> bool {
        match self.tx.send(job) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Recording queue closed, dropping job for {}", e.0.recording_sid);
                false
            }
        }
    }
}

pub struct RecordingWorker {
    store: Arc<dyn Store>,
    telephony: Arc<dyn TelephonyProvider>,
    storage: Arc<dyn RecordingStorage>,
    transcriber: Option<Arc<dyn Transcriber>>,
    queue: RecordingQueue,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RecordingWorker {
    pub fn new(
        store: Arc<dyn Store>,
        telephony: Arc<dyn TelephonyProvider>,
        storage: Arc<dyn RecordingStorage>,
        transcriber: Option<Arc<dyn Transcriber>>,
        queue: RecordingQueue,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            telephony,
            storage,
            transcriber,
            queue,
            max_attempts: max_attempts.max(1),
            retry_delay: Duration::from_secs(30),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consume jobs until cancelled
    pub async fn run(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<RecordingJob>, cancel: CancellationToken) {
        tracing::info!("Recording worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => self.handle(job, &cancel).await,
                    None => break,
                },
            }
        }
        tracing::info!("Recording worker stopped");
    }

    async fn handle(&self, job: RecordingJob, cancel: &CancellationToken) {
        match self.process(&job).await {
            Ok(JobOutcome::Stored(recording)) => {
                tracing::info!("Recording {} stored for call {}", job.recording_sid, recording.call_id);
            }
            Ok(JobOutcome::AlreadyStored) => {
                tracing::debug!("Recording {} already stored", job.recording_sid);
            }
            Ok(JobOutcome::UnknownCall) => {
                tracing::warn!("Recording {} references unknown call {}", job.recording_sid, job.call_sid);
            }
            Err(e) if job.attempt + 1 < self.max_attempts => {
                let delay = self.retry_delay * (job.attempt + 1);
                tracing::warn!(
                    "Recording {} attempt {} failed: {}; retrying in {:?}",
                    job.recording_sid,
                    job.attempt + 1,
                    e,
                    delay
                );
                let queue = self.queue.clone();
                let cancel = cancel.clone();
                let retry = RecordingJob {
                    attempt: job.attempt + 1,
                    ..job
                };
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            queue.enqueue(retry);
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!(
                    "Recording {} for call {} failed after {} attempts: {}",
                    job.recording_sid,
                    job.call_sid,
                    self.max_attempts,
                    e
                );
            }
        }
    }

    /// Run one attempt of a job
    pub async fn process(&self, job: &RecordingJob) -> Result<JobOutcome, RecordingJobError> {
        let call = {
            let mut tx = self.store.begin().await?;
            if tx.recording_by_external_id(&job.recording_sid).await?.is_some() {
                return Ok(JobOutcome::AlreadyStored);
            }
            match tx.call_by_external_id(&job.call_sid).await? {
                Some(call) => call,
                None => return Ok(JobOutcome::UnknownCall),
            }
        };

        let audio = self.telephony.fetch_recording(&job.recording_url).await?;
        let stored = self
            .storage
            .store_recording(call.id, &job.recording_sid, audio.clone(), "mp3")
            .await?;

        let mut transcription_path = None;
        if call.transcription_enabled {
            if let Some(transcriber) = &self.transcriber {
                let file_name = format!("{}.mp3", job.recording_sid);
                match transcriber.transcribe(audio, &file_name).await {
                    Ok(text) => {
                        let transcript = self.storage.store_transcript(call.id, &job.recording_sid, &text).await?;
                        transcription_path = Some(transcript.file_path);
                    }
                    // Keep the recording on the final attempt rather than lose both
                    Err(e) if job.attempt + 1 >= self.max_attempts => {
                        tracing::warn!("Giving up on transcript for {}: {}", job.recording_sid, e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let recording = {
            let mut tx = self.store.begin().await?;
            if tx.recording_by_external_id(&job.recording_sid).await?.is_some() {
                return Ok(JobOutcome::AlreadyStored);
            }
            let recording = tx
                .insert_recording(NewCallRecording {
                    call_id: call.id,
                    external_id: job.recording_sid.clone(),
                    path: stored.file_path,
                    duration_seconds: job.duration_seconds,
                    file_size: stored.file_size as i64,
                    transcription_path,
                    created_at: Utc::now(),
                })
                .await?;
            tx.commit().await?;
            recording
        };

        if let Err(e) = self.telephony.delete_recording(&job.recording_sid).await {
            tracing::warn!("Could not delete provider copy of {}: {}", job.recording_sid, e);
        }

        Ok(JobOutcome::Stored(recording))
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::models::*;
    use crate::server::storage::LocalFileStorage;
    use crate::server::store::memory::MemoryStore;

    async fn seed_call(store: &MemoryStore, external_id: &str, transcribe: bool) -> i64 {
        store
            .seed(|s| {
                let company = s.add_company("Acme");
                let config = s.add_config(company.id, "5559990000");
                let number = s.add_number(company.id, Some(config.id), None, "5550000001", 1);
                let contact = s.add_contact(company.id, "5551230000", uuid::Uuid::new_v4());
                let id = s.next_id();
                let now = Utc::now();
                s.calls.push(Call {
                    id,
                    company_id: company.id,
                    phone_number_id: number.id,
                    keyword_tracking_pool_id: None,
                    keyword_tracking_pool_session_id: None,
                    contact_id: contact.id,
                    external_id: external_id.to_string(),
                    direction: CallDirection::Inbound,
                    // Recordings arrive after the call has finished
                    status: CallStatus::Completed,
                    first_call: true,
                    attribution: number.attribution(),
                    recording_enabled: true,
                    transcription_enabled: transcribe,
                    forwarded_to: "+15559990000".to_string(),
                    duration: Some(60),
                    created_at: now,
                    updated_at: now,
                });
                id
            })
            .await
    }

    fn job(call_sid: &str) -> RecordingJob {
        RecordingJob {
            call_sid: call_sid.to_string(),
            recording_sid: "RE100".to_string(),
            recording_url: "https://api.twilio.test/Recordings/RE100".to_string(),
            duration_seconds: 58,
            attempt: 0,
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: MemoryStore,
        telephony: Arc<FakeTelephony>,
        worker: RecordingWorker,
        jobs: mpsc::UnboundedReceiver<RecordingJob>,
    }

    fn harness(telephony: FakeTelephony, max_attempts: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let telephony = Arc::new(telephony);
        let (queue, jobs) = RecordingQueue::channel();
        let worker = RecordingWorker::new(
            Arc::new(store.clone()),
            telephony.clone(),
            Arc::new(LocalFileStorage::new(dir.path(), 1.0)),
            Some(Arc::new(FakeTranscriber)),
            queue,
            max_attempts,
        )
        .with_retry_delay(Duration::from_millis(10));
        Harness {
            _dir: dir,
            store,
            telephony,
            worker,
            jobs,
        }
    }

    #[tokio::test]
    async fn test_process_stores_recording_once() {
        let h = harness(FakeTelephony::default(), 3);
        let call_id = seed_call(&h.store, "CA1", false).await;

        let outcome = h.worker.process(&job("CA1")).await.unwrap();
        let recording = match outcome {
            JobOutcome::Stored(recording) => recording,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(recording.call_id, call_id);
        assert_eq!(recording.duration_seconds, 58);
        assert!(recording.path.ends_with("RE100.mp3"));
        assert!(recording.transcription_path.is_none());
        assert_eq!(h.telephony.deleted(), vec!["RE100".to_string()]);

        assert!(matches!(h.worker.process(&job("CA1")).await.unwrap(), JobOutcome::AlreadyStored));
        assert_eq!(h.store.snapshot().await.recordings.len(), 1);
    }

    #[tokio::test]
    async fn test_process_transcribes_when_enabled() {
        let h = harness(FakeTelephony::default(), 3);
        seed_call(&h.store, "CA1", true).await;

        match h.worker.process(&job("CA1")).await.unwrap() {
            JobOutcome::Stored(recording) => {
                assert!(recording.transcription_path.unwrap().ends_with("RE100.txt"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_call_is_a_no_op() {
        let h = harness(FakeTelephony::default(), 3);

        assert!(matches!(h.worker.process(&job("CA-missing")).await.unwrap(), JobOutcome::UnknownCall));
        assert_eq!(h.telephony.fetches.load(Ordering::SeqCst), 0);
        assert!(h.store.snapshot().await.recordings.is_empty());
    }

    async fn wait_for_recordings(store: &MemoryStore, count: usize) -> bool {
        for _ in 0..100 {
            if store.snapshot().await.recordings.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_worker_retries_failed_downloads() {
        let Harness { _dir, store, telephony, worker, jobs } = harness(FakeTelephony::failing(2), 3);
        seed_call(&store, "CA1", false).await;

        let worker = Arc::new(worker);
        let cancel = CancellationToken::new();
        worker.queue.enqueue(job("CA1"));
        let handle = tokio::spawn(worker.clone().run(jobs, cancel.clone()));

        assert!(wait_for_recordings(&store, 1).await);
        assert_eq!(telephony.fetches.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_max_attempts() {
        let Harness { _dir, store, telephony, worker, jobs } = harness(FakeTelephony::failing(10), 3);
        seed_call(&store, "CA1", false).await;

        let worker = Arc::new(worker);
        let cancel = CancellationToken::new();
        worker.queue.enqueue(job("CA1"));
        let handle = tokio::spawn(worker.clone().run(jobs, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(telephony.fetches.load(Ordering::SeqCst), 3);
        assert!(store.snapshot().await.recordings.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
