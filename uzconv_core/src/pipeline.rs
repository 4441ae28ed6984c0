//! Parallel block transcoding.
//!
//! ```text
//!  source thread          worker pool (N)             caller thread
//! ┌─────────────┐ work  ┌──────────────────┐ done  ┌──────────────────┐
//! │ read_block  │──────▶│ decompress (A)   │──────▶│ Reorder → append │
//! │ 0, 1, 2 ... │ queue │ compress   (B)   │ queue │ finish           │
//! └─────────────┘       └──────────────────┘       └──────────────────┘
//! ```
//!
//! Both queues are bounded, so a slow stage back-pressures the ones before
//! it. Workers complete in any order; the reassembly stage on the caller
//! thread restores index order before every write, so the output is byte
//! identical for any worker count.
//!
//! The source never reads block `i` until `i < next + queue_depth + workers`,
//! where `next` is the first block not yet written. One slow block therefore
//! holds back at most that many finished blocks in the reorder map.
//!
//! The first error anywhere (a worker panic included) cancels the run and
//! reaches the reassembly stage, which stops and returns it. Dropping the
//! queue ends unblocks every other thread, and all of them are joined before
//! returning.

use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::codec::{Codec, RawLen};
use crate::error::{Error, Result};
use crate::format::ContainerKind;
use crate::reader::Reader;
use crate::reorder::Reorder;
use crate::writer::Writer;

/// Worker pool and queue sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Number of decompress+compress worker threads.
    pub workers: usize,
    /// Capacity of the queue between the source stage and the workers.
    pub queue_depth: usize,
}

impl TranscodeOptions {
    /// `workers` threads with a work queue twice as deep.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_depth: workers * 2,
        }
    }
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self::with_workers(thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeSummary {
    pub blocks: u32,
    /// Compressed payload bytes read from the source.
    pub source_bytes: u64,
    /// Compressed payload bytes written to the destination.
    pub dest_bytes: u64,
    /// Most blocks ever held back by the reassembly stage.
    pub peak_pending: usize,
}

/// Cancellation flag plus the run-ahead window shared by every stage.
struct Control {
    cancelled: AtomicBool,
    span: u32,
    next: Mutex<u32>,
    moved: Condvar,
}

impl Control {
    fn new(span: u32) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            span: span.max(1),
            next: Mutex::new(0),
            moved: Condvar::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // taken so a source about to wait cannot miss the wakeup
        let _next = self.next.lock();
        self.moved.notify_all();
    }

    /// Block until `index` falls inside the window. Returns `false` if the
    /// run was cancelled meanwhile.
    fn wait_turn(&self, index: u32) -> bool {
        let mut next = self.next.lock();
        while !self.is_cancelled() && index >= next.saturating_add(self.span) {
            self.moved.wait(&mut next);
        }
        !self.is_cancelled()
    }

    fn advance(&self, written: u32) {
        *self.next.lock() = written;
        self.moved.notify_all();
    }
}

/// Cancels the run if the owning worker unwinds.
struct CancelOnPanic<'a>(&'a Control);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

struct Work {
    index: u32,
    raw_len: RawLen,
    data: Vec<u8>,
}

struct Done {
    index: u32,
    data: Vec<u8>,
}

/// Decompress one block with `decoder` and recompress it with `encoder`.
pub fn transcode_block(
    index: u32,
    compressed: &[u8],
    raw_len: RawLen,
    decoder: &dyn Codec,
    encoder: &dyn Codec,
) -> Result<Vec<u8>> {
    let plain = decoder
        .decompress_as(compressed, raw_len)
        .map_err(|source| Error::Codec { index, source })?;
    encoder
        .compress_block(&plain)
        .map_err(|source| Error::Codec { index, source })
}

/// Transcode every block of `reader` into `writer` and finish it.
///
/// `writer` must be freshly created with the reader's block size and count.
pub fn transcode<R, W>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
    decoder: &dyn Codec,
    encoder: &dyn Codec,
    opts: &TranscodeOptions,
) -> Result<TranscodeSummary>
where
    R: Read + Seek + Send,
    W: Write + Seek,
{
    let block_count = reader.block_count();
    {
        let dst = writer.header();
        if dst.block_count != block_count || dst.block_size != reader.block_size() {
            return Err(Error::Sequence(format!(
                "destination declares {} blocks of {} bytes, source has {} blocks of {} bytes",
                dst.block_count,
                dst.block_size,
                block_count,
                reader.block_size()
            )));
        }
        if writer.appended() != 0 || writer.is_finished() {
            return Err(Error::Sequence("destination writer already in use".into()));
        }
    }

    let workers = opts.workers.max(1);
    let source_bytes = reader.payload_size();
    info!(
        blocks = block_count,
        block_size = reader.block_size(),
        workers,
        from = decoder.name(),
        to = encoder.name(),
        "transcoding"
    );
    let started = Instant::now();

    let queue_depth = opts.queue_depth.max(1);
    let span = u32::try_from(queue_depth.saturating_add(workers)).unwrap_or(u32::MAX);
    let control = Control::new(span);
    let (work_tx, work_rx) = mpsc::sync_channel::<Work>(queue_depth);
    let (done_tx, done_rx) = mpsc::sync_channel::<Result<Done>>(workers);
    // owned by the workers alone: once the last one exits the receiver drops
    // and a source blocked on a full queue is released
    let work_rx = Arc::new(Mutex::new(work_rx));

    let (outcome, panicked) = thread::scope(|scope| {
        let control = &control;

        let source = {
            let done_tx = done_tx.clone();
            scope.spawn(move || emit_blocks(reader, work_tx, done_tx, control))
        };

        let pool: Vec<_> = (0..workers)
            .map(|id| {
                let work_rx = Arc::clone(&work_rx);
                let done_tx = done_tx.clone();
                scope.spawn(move || run_worker(id, work_rx, done_tx, decoder, encoder, control))
            })
            .collect();
        // the reassembly stage must see the queue close once all producers exit
        drop(done_tx);
        drop(work_rx);

        let outcome = reassemble(done_rx, writer, control);

        let mut panicked = None;
        if source.join().is_err() {
            panicked = Some("source");
        }
        for handle in pool {
            if handle.join().is_err() {
                panicked.get_or_insert("worker");
            }
        }
        (outcome, panicked)
    });

    let peak_pending = match (outcome, panicked) {
        (Err(e), _) if !matches!(e, Error::Incomplete { .. }) => return Err(e),
        (_, Some(who)) => return Err(Error::WorkerPanicked(who)),
        (outcome, None) => outcome?,
    };

    let offsets = writer.offsets();
    let summary = TranscodeSummary {
        blocks: block_count,
        source_bytes,
        dest_bytes: offsets[offsets.len() - 1] - offsets[0],
        peak_pending,
    };
    info!(
        blocks = summary.blocks,
        source_bytes = summary.source_bytes,
        dest_bytes = summary.dest_bytes,
        peak_pending = summary.peak_pending,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "transcode complete"
    );
    Ok(summary)
}

/// Open `source`, transcode it into a new `target` container on `dest`, and
/// return the destination stream.
pub fn convert<R, W>(
    source: R,
    dest: W,
    target: ContainerKind,
    decoder: &dyn Codec,
    encoder: &dyn Codec,
    opts: &TranscodeOptions,
) -> Result<(W, TranscodeSummary)>
where
    R: Read + Seek + Send,
    W: Write + Seek,
{
    let mut reader = Reader::open(source)?;
    let mut writer = Writer::create(dest, target, reader.block_size(), reader.block_count())?;
    let summary = transcode(&mut reader, &mut writer, decoder, encoder, opts)?;
    Ok((writer.into_inner(), summary))
}

// ── Stages ─────────────────────────────────────────────────────────────────

fn emit_blocks<R: Read + Seek>(
    reader: &mut Reader<R>,
    work_tx: SyncSender<Work>,
    done_tx: SyncSender<Result<Done>>,
    control: &Control,
) {
    for index in 0..reader.block_count() {
        if !control.wait_turn(index) {
            debug!(index, "source stage cancelled");
            return;
        }
        let raw_len = reader.raw_len(index);
        match reader.read_block(index) {
            Ok(data) => {
                trace!(index, len = data.len(), "read block");
                if work_tx.send(Work { index, raw_len, data }).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(index, error = %e, "failed to read source block");
                control.cancel();
                let _ = done_tx.send(Err(e));
                return;
            }
        }
    }
}

fn run_worker(
    id: usize,
    work_rx: Arc<Mutex<Receiver<Work>>>,
    done_tx: SyncSender<Result<Done>>,
    decoder: &dyn Codec,
    encoder: &dyn Codec,
    control: &Control,
) {
    let _guard = CancelOnPanic(control);
    loop {
        let work = match work_rx.lock().recv() {
            Ok(work) => work,
            Err(_) => break,
        };
        if control.is_cancelled() {
            break;
        }

        let result = transcode_block(work.index, &work.data, work.raw_len, decoder, encoder)
            .map(|data| Done { index: work.index, data });
        let failed = result.is_err();
        if failed {
            control.cancel();
        } else {
            trace!(worker = id, index = work.index, "transcoded block");
        }
        if done_tx.send(result).is_err() || failed {
            break;
        }
    }
}

/// Returns the peak number of blocks held back for reordering.
fn reassemble<W: Write + Seek>(
    done_rx: Receiver<Result<Done>>,
    writer: &mut Writer<W>,
    control: &Control,
) -> Result<usize> {
    let block_count = writer.header().block_count;
    let mut reorder = Reorder::new();

    while reorder.next_wanted() < block_count {
        let step = match done_rx.recv() {
            Ok(Ok(done)) => accept(&mut reorder, writer, done, control),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Incomplete {
                index: reorder.next_wanted(),
            }),
        };
        if let Err(e) = step {
            control.cancel();
            warn!(error = %e, written = reorder.next_wanted(), "transcode aborted");
            return Err(e);
        }
    }

    writer.finish()?;
    Ok(reorder.peak_pending())
}

fn accept<W: Write + Seek>(
    reorder: &mut Reorder<Vec<u8>>,
    writer: &mut Writer<W>,
    done: Done,
    control: &Control,
) -> Result<()> {
    let before = reorder.next_wanted();
    reorder.insert(done.index, done.data)?;
    while let Some((index, block)) = reorder.pop_ready() {
        writer.append(&block)?;
        debug!(index, len = block.len(), "wrote block");
    }
    if reorder.next_wanted() != before {
        control.advance(reorder.next_wanted());
    }
    Ok(())
}
