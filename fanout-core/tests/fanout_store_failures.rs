/*
    fanout_store_failures.rs - Store failures during broadcast and retraction

    A store failure is fatal to the call it happens in, and only to that call:
    the error reaches the caller, delivered copies are not rolled back, and
    whatever was recorded stays retractable afterwards.
*/

use fanout_core::config::BroadcastConfig;
use fanout_core::core_fanout::adapters::MockTransport;
use fanout_core::core_fanout::{
    BatchId, BatchMember, BatchState, BatchStore, BroadcastBatch, ChatId, DestinationId,
    FanoutError, FanoutService, FanoutSqlStore, MessageId, OriginRef, StoreError, StoreResult,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

const C1: DestinationId = DestinationId(-1001);
const C2: DestinationId = DestinationId(-1002);
const C3: DestinationId = DestinationId(-1003);

/// Batch store that fails selected calls
struct FlakyStore {
    inner: Arc<FanoutSqlStore>,
    /// Remaining `list_members` calls to fail
    list_members_failures: AtomicUsize,
    /// Remaining `purge_batch` calls to fail
    purge_failures: AtomicUsize,
    /// 1-based `add_member` call to fail; 0 never fails
    fail_add_member_call: AtomicUsize,
    add_member_calls: AtomicUsize,
}

fn take(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn transient() -> StoreError {
    StoreError::Corrupt("transient".to_string())
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(FanoutSqlStore::memory().unwrap()),
            list_members_failures: AtomicUsize::new(0),
            purge_failures: AtomicUsize::new(0),
            fail_add_member_call: AtomicUsize::new(0),
            add_member_calls: AtomicUsize::new(0),
        }
    }
}

impl BatchStore for FlakyStore {
    fn create_batch(&self, batch_id: &BatchId, origin: OriginRef) -> StoreResult<()> {
        self.inner.create_batch(batch_id, origin)
    }

    fn add_member(
        &self,
        batch_id: &BatchId,
        destination_id: DestinationId,
        remote_message_id: MessageId,
    ) -> StoreResult<()> {
        let call = self.add_member_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_add_member_call.load(Ordering::SeqCst) {
            return Err(transient());
        }
        self.inner.add_member(batch_id, destination_id, remote_message_id)
    }

    fn activate_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        self.inner.activate_batch(batch_id)
    }

    fn find_batch_by_origin(&self, origin: OriginRef) -> StoreResult<Option<BatchId>> {
        self.inner.find_batch_by_origin(origin)
    }

    fn list_members(&self, batch_id: &BatchId) -> StoreResult<Vec<BatchMember>> {
        if take(&self.list_members_failures) {
            return Err(transient());
        }
        self.inner.list_members(batch_id)
    }

    fn claim_batch(&self, batch_id: &BatchId) -> StoreResult<bool> {
        self.inner.claim_batch(batch_id)
    }

    fn release_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        self.inner.release_batch(batch_id)
    }

    fn purge_batch(&self, batch_id: &BatchId) -> StoreResult<()> {
        if take(&self.purge_failures) {
            return Err(transient());
        }
        self.inner.purge_batch(batch_id)
    }

    fn get_batch(&self, batch_id: &BatchId) -> StoreResult<Option<BroadcastBatch>> {
        self.inner.get_batch(batch_id)
    }

    fn recent_batches(&self, limit: usize) -> StoreResult<Vec<BroadcastBatch>> {
        self.inner.recent_batches(limit)
    }
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

fn origin() -> OriginRef {
    OriginRef::new(ChatId(42), MessageId(1))
}

fn setup(
    destinations: &[DestinationId],
    config: &BroadcastConfig,
) -> (Arc<FlakyStore>, MockTransport, FanoutService) {
    let store = Arc::new(FlakyStore::new());
    let transport = MockTransport::new();
    let service = FanoutService::from_parts(
        store.clone(),
        store.inner.clone(),
        Arc::new(transport.clone()),
        config,
    );

    for destination in destinations {
        service.handle_register(*destination).unwrap();
    }

    (store, transport, service)
}

fn state_of(store: &FlakyStore, batch_id: &BatchId) -> BatchState {
    store.get_batch(batch_id).unwrap().unwrap().state
}

/// A failed member load hands the batch back instead of stranding it.
#[tokio::test]
async fn test_failed_member_load_keeps_batches_retractable() {
    let (store, transport, service) = setup(&[C1, C2], &BroadcastConfig::default());
    let first = service.handle_broadcast(origin()).await.unwrap();
    let second = service.handle_broadcast(origin()).await.unwrap();
    assert_eq!(transport.live_messages().len(), 4);

    store.list_members_failures.store(1, Ordering::SeqCst);
    let err = service.handle_retract(origin()).await.unwrap_err();

    assert!(matches!(err, FanoutError::Store(StoreError::Corrupt(_))));
    assert_eq!(state_of(&store, &second.batch_id), BatchState::Active);
    assert!(transport.delete_calls().is_empty());

    let retraction = service.handle_retract(origin()).await.unwrap();
    assert_eq!(retraction.batch_id, second.batch_id);
    assert_eq!(retraction.deleted_count, 2);

    let retraction = service.handle_retract(origin()).await.unwrap();
    assert_eq!(retraction.batch_id, first.batch_id);
    assert_eq!(retraction.deleted_count, 2);

    assert!(transport.live_messages().is_empty());
    assert!(service.handle_retract(origin()).await.unwrap_err().is_not_found());
}

/// A failed purge surfaces the error after the deletes went out, and the
/// batch can be retracted again to clear the record.
#[tokio::test]
async fn test_failed_purge_keeps_batch_retractable() {
    let (store, transport, service) = setup(&[C1, C2], &BroadcastConfig::default());
    let broadcast = service.handle_broadcast(origin()).await.unwrap();

    store.purge_failures.store(1, Ordering::SeqCst);
    let (logs, _guard) = capture_logs();
    let err = service.handle_retract(origin()).await.unwrap_err();

    assert!(matches!(err, FanoutError::Store(StoreError::Corrupt(_))));
    assert!(transport.live_messages().is_empty());
    let output = logs.contents();
    assert!(output.contains("Failed to purge batch"), "logs: {}", output);
    assert!(output.contains("deleted=2"), "logs: {}", output);
    assert!(output.contains("failed=0"), "logs: {}", output);

    let batch = store.get_batch(&broadcast.batch_id).unwrap().unwrap();
    assert_eq!(batch.state, BatchState::Active);
    assert_eq!(batch.members.len(), 2);

    // The copies are already gone, so the second pass only clears the record
    let retraction = service.handle_retract(origin()).await.unwrap();
    assert_eq!(retraction.deleted_count, 0);
    assert_eq!(retraction.failed_count, 2);
    assert_eq!(store.get_batch(&broadcast.batch_id).unwrap(), None);
    assert!(service.handle_retract(origin()).await.unwrap_err().is_not_found());
}

/// A failed member write aborts the broadcast; copies already delivered stay
/// delivered and the recorded ones remain retractable.
#[tokio::test]
async fn test_failed_member_write_aborts_broadcast() {
    let config = BroadcastConfig {
        max_concurrency: 1,
        ..BroadcastConfig::default()
    };
    let (store, transport, service) = setup(&[C1, C2, C3], &config);
    store.fail_add_member_call.store(2, Ordering::SeqCst);

    let (logs, _guard) = capture_logs();
    let err = service.handle_broadcast(origin()).await.unwrap_err();

    assert!(matches!(err, FanoutError::Store(StoreError::Corrupt(_))));
    let output = logs.contents();
    assert!(output.contains("Failed to record copy"), "logs: {}", output);
    assert!(output.contains("delivered=2"), "logs: {}", output);

    // C3 was never attempted; C1 and C2 were delivered and are not rolled back
    let copied: Vec<_> = transport.copy_calls().into_iter().map(|(d, _)| d).collect();
    assert_eq!(copied, vec![C1, C2]);
    assert_eq!(transport.live_messages().len(), 2);

    let batch_id = store.find_batch_by_origin(origin()).unwrap().unwrap();
    let batch = store.get_batch(&batch_id).unwrap().unwrap();
    assert_eq!(batch.state, BatchState::Active);
    assert_eq!(batch.members, vec![BatchMember::new(C1, MessageId(1000))]);

    let retraction = service.handle_retract(origin()).await.unwrap();
    assert_eq!(retraction.deleted_count, 1);
    assert_eq!(transport.live_messages(), vec![(C2, MessageId(1001))]);
}
