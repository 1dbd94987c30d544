// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch orchestration — group pages into questions, dispatch one task per
// question, and fold the outcomes into a fresh report.
//
// Results arrive in completion order and are folded here, on the caller's
// task. Nothing a worker runs ever touches the report.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cropwerk_canvas::{OutputOptions, file_target_width, group_questions, process_logical_question};
use cropwerk_core::config::PipelineConfig;
use cropwerk_core::error::{CropwerkError, Result};
use cropwerk_core::types::{FailureKind, Page, QuestionImage};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::abort::AbortSignal;
use crate::failure::classify_error;
use crate::pool::{PoolStats, WorkerPool};

/// Identity of one logical question within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QuestionRef {
    pub file_id: String,
    pub question_id: String,
}

/// A question whose task failed.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionFailure {
    pub question: QuestionRef,
    pub kind: FailureKind,
    pub message: String,
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Dispatched(QuestionRef),
    Completed(QuestionRef),
    /// The question had no usable box.
    Dropped(QuestionRef),
    Failed(QuestionFailure),
    Finished {
        images: usize,
        failures: usize,
        dropped: usize,
        not_dispatched: usize,
    },
}

/// Everything a batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by file, page, then question id.
    pub images: Vec<QuestionImage>,
    pub failures: Vec<QuestionFailure>,
    pub dropped: Vec<QuestionRef>,
    /// Questions never handed to the pool because the batch was aborted.
    pub not_dispatched: usize,
}

impl BatchReport {
    /// Questions that ended in an image, a drop, or a failure.
    pub fn settled(&self) -> usize {
        self.images.len() + self.failures.len() + self.dropped.len()
    }
}

/// Composite every question found on `pages`.
///
/// The abort signal is checked before each dispatch; once set, the remaining
/// questions are counted as not dispatched while already-dispatched ones run
/// to completion. Individual question failures never fail the batch.
pub async fn run_batch(
    pool: &WorkerPool<Option<QuestionImage>>,
    pages: &[Arc<Page>],
    config: &PipelineConfig,
    abort: &AbortSignal,
    progress: Option<&mpsc::UnboundedSender<BatchEvent>>,
) -> Result<BatchReport> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    let span = info_span!("batch", %run_id);
    run(pool, pages, config, abort, progress, run_id)
        .instrument(span)
        .await
}

async fn run(
    pool: &WorkerPool<Option<QuestionImage>>,
    pages: &[Arc<Page>],
    config: &PipelineConfig,
    abort: &AbortSignal,
    progress: Option<&mpsc::UnboundedSender<BatchEvent>>,
    run_id: Uuid,
) -> Result<BatchReport> {
    let started_at = Utc::now();
    let emit = |event: BatchEvent| {
        if let Some(tx) = progress {
            // A closed receiver just means nobody is listening any more.
            let _ = tx.send(event);
        }
    };

    let questions = group_questions(pages);
    let targets = target_widths(pages);
    let settings = config.crop;
    let output = OutputOptions::from(config);
    let total = questions.len();
    info!(
        pages = pages.len(),
        questions = total,
        concurrency = pool.concurrency(),
        "batch started"
    );

    // A question is handed to the pool only when a worker can start it, so
    // the abort check below sits between real dispatches.
    let mut stats = pool.subscribe();
    let mut tasks = JoinSet::new();
    let mut in_flight: HashMap<task::Id, QuestionRef> = HashMap::new();
    let mut tally = Tally::default();
    let mut pending = questions.into_iter().peekable();
    let mut dispatched = 0;
    let mut not_dispatched = 0;

    loop {
        if pending.peek().is_some() {
            if abort.is_aborted() {
                not_dispatched = pending.by_ref().count();
                warn!(dispatched, not_dispatched, "batch aborted; remaining questions skipped");
                continue;
            }
            let room = has_room(&stats.borrow_and_update());
            if room {
                let Some(question) = pending.next() else {
                    continue;
                };
                let question_ref = QuestionRef {
                    file_id: question.file_id.clone(),
                    question_id: question.id.clone(),
                };
                let target = targets.get(&question.file_id).copied();
                let handle = pool.enqueue(move || {
                    process_logical_question(&question, &settings, target, &output)
                });
                emit(BatchEvent::Dispatched(question_ref.clone()));
                let collector = tasks.spawn(handle.join());
                in_flight.insert(collector.id(), question_ref);
                dispatched += 1;
                continue;
            }
            tokio::select! {
                changed = stats.changed() => {
                    if changed.is_err() {
                        return Err(CropwerkError::Pool("worker pool shut down".into()));
                    }
                }
                Some(joined) = tasks.join_next_with_id() => {
                    tally.fold(joined, &mut in_flight, &emit);
                }
            }
        } else {
            match tasks.join_next_with_id().await {
                Some(joined) => tally.fold(joined, &mut in_flight, &emit),
                None => break,
            }
        }
    }

    let Tally {
        mut images,
        failures,
        dropped,
    } = tally;
    images.sort_by(presentation_order);
    emit(BatchEvent::Finished {
        images: images.len(),
        failures: failures.len(),
        dropped: dropped.len(),
        not_dispatched,
    });
    info!(
        images = images.len(),
        failures = failures.len(),
        dropped = dropped.len(),
        not_dispatched,
        "batch finished"
    );

    Ok(BatchReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        images,
        failures,
        dropped,
        not_dispatched,
    })
}

/// Whether the pool can start another task right away.
fn has_room(stats: &PoolStats) -> bool {
    stats.queued == 0 && stats.active < stats.concurrency
}

/// Outcomes folded so far, in completion order.
#[derive(Default)]
struct Tally {
    images: Vec<QuestionImage>,
    failures: Vec<QuestionFailure>,
    dropped: Vec<QuestionRef>,
}

impl Tally {
    fn fold(
        &mut self,
        joined: std::result::Result<(task::Id, Result<Option<QuestionImage>>), JoinError>,
        in_flight: &mut HashMap<task::Id, QuestionRef>,
        emit: &impl Fn(BatchEvent),
    ) {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(err) => {
                let id = err.id();
                let message = format!("result collector failed: {err}");
                (id, Err(CropwerkError::Pool(message)))
            }
        };
        let Some(question) = in_flight.remove(&id) else {
            warn!(task = %id, "result for unknown collector ignored");
            return;
        };

        match outcome {
            Ok(Some(image)) => {
                debug!(question = %question.question_id, file = %question.file_id, "question completed");
                emit(BatchEvent::Completed(question));
                self.images.push(image);
            }
            Ok(None) => {
                emit(BatchEvent::Dropped(question.clone()));
                self.dropped.push(question);
            }
            Err(err) => {
                let failure = QuestionFailure {
                    kind: classify_error(&err),
                    message: err.to_string(),
                    question,
                };
                warn!(
                    question = %failure.question.question_id,
                    file = %failure.question.file_id,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "question failed"
                );
                emit(BatchEvent::Failed(failure.clone()));
                self.failures.push(failure);
            }
        }
    }
}

/// Widest box per file, keyed by file id.
fn target_widths(pages: &[Arc<Page>]) -> HashMap<String, u32> {
    let mut by_file: HashMap<&str, Vec<&Page>> = HashMap::new();
    for page in pages {
        by_file.entry(page.file_id.as_str()).or_default().push(page);
    }
    by_file
        .into_iter()
        .map(|(file_id, file_pages)| (file_id.to_owned(), file_target_width(file_pages)))
        .collect()
}

/// Deterministic output order: file id, page number, then question id
/// compared numerically when it parses as a number (numeric ids first),
/// falling back to plain string order.
pub fn presentation_order(a: &QuestionImage, b: &QuestionImage) -> Ordering {
    a.file_id
        .cmp(&b.file_id)
        .then(a.page_number.cmp(&b.page_number))
        .then_with(|| {
            match (a.id.parse::<f64>().ok(), b.id.parse::<f64>().ok()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwerk_canvas::encode::encode_image;
    use cropwerk_core::config::OutputFormat;
    use cropwerk_core::types::{Boxes, Detection, ImageFormat, NormalizedBox};
    use image::{Rgba, RgbaImage};

    const QUESTIONS_PER_PAGE: u32 = 10;

    /// A 600x1000 page with one ink bar per question slot; bar width varies
    /// with the slot so every question image differs.
    fn exam_page(file_id: &str, page_number: u32, first_id: u32) -> Arc<Page> {
        let (width, height) = (600u32, 1000u32);
        let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut detections = Vec::new();
        for slot in 0..QUESTIONS_PER_PAGE {
            let y0 = slot * 100 + 20;
            let bar_w = 100 + 30 * slot;
            for y in y0..y0 + 40 {
                for x in 60..60 + bar_w {
                    img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
            let ymin = f64::from(slot * 100 + 5);
            detections.push(Detection::normal(
                (first_id + slot).to_string(),
                Boxes::Single(NormalizedBox::new(ymin, 50.0, ymin + 80.0, 950.0)),
            ));
        }
        let png = encode_image(&img, OutputFormat::Png).expect("encode page");
        Arc::new(Page {
            file_id: file_id.into(),
            page_number,
            width,
            height,
            image: Arc::from(png),
            detections,
        })
    }

    fn exam(pages: u32) -> Vec<Arc<Page>> {
        (1..=pages)
            .map(|n| exam_page("exam.pdf", n, (n - 1) * QUESTIONS_PER_PAGE + 1))
            .collect()
    }

    async fn run_at(concurrency: usize, pages: &[Arc<Page>]) -> BatchReport {
        let pool = WorkerPool::new(concurrency).expect("pool");
        run_at_pool(&pool, pages).await
    }

    async fn run_at_pool(pool: &WorkerPool<Option<QuestionImage>>, pages: &[Arc<Page>]) -> BatchReport {
        let config = PipelineConfig {
            concurrency: pool.concurrency(),
            ..PipelineConfig::default()
        };
        run_batch(pool, pages, &config, &AbortSignal::new(), None)
            .await
            .expect("batch")
    }

    fn digests(report: &BatchReport) -> HashMap<String, String> {
        report
            .images
            .iter()
            .map(|img| (img.id.clone(), img.digest.clone()))
            .collect()
    }

    #[tokio::test]
    async fn concurrency_does_not_change_output() {
        let pages = exam(5);
        let serial = run_at(1, &pages).await;
        let parallel = run_at(8, &pages).await;

        assert_eq!(serial.images.len(), 50);
        assert_eq!(digests(&serial), digests(&parallel));
        let ids: Vec<_> = parallel.images.iter().map(|img| img.id.as_str()).collect();
        let serial_ids: Vec<_> = serial.images.iter().map(|img| img.id.as_str()).collect();
        assert_eq!(ids, serial_ids);
        assert_eq!(ids[..3], ["1", "2", "3"]);
        assert_ne!(serial.run_id, parallel.run_id);
    }

    #[tokio::test]
    async fn bad_page_fails_only_its_questions() {
        let mut pages = exam(3);
        let broken = Arc::new(Page {
            image: Arc::from(b"not a png".to_vec()),
            ..(*pages[1]).clone()
        });
        pages[1] = broken;

        let report = run_at(4, &pages).await;
        assert_eq!(report.images.len(), 20);
        assert_eq!(report.failures.len(), 10);
        assert!(report.failures.iter().all(|f| f.kind == FailureKind::Input));
        assert_eq!(report.settled(), 30);
    }

    #[tokio::test]
    async fn questions_share_the_file_width() {
        let report = run_at(4, &exam(1)).await;
        // Widest box: 900 normalized units of 600px = 540px, plus 2 x 10 canvas padding.
        assert!(report.images.iter().all(|img| img.width == 560));
        assert!(report.images.iter().all(|img| img.format == ImageFormat::Png));
    }

    #[tokio::test]
    async fn unusable_question_is_dropped_not_failed() {
        let page = Arc::new(Page {
            detections: vec![Detection::normal("1", Boxes::Multi(Vec::new()))],
            ..(*exam_page("exam.pdf", 1, 1)).clone()
        });
        let report = run_at(2, &[page]).await;
        assert!(report.images.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(
            report.dropped,
            vec![QuestionRef {
                file_id: "exam.pdf".into(),
                question_id: "1".into()
            }]
        );
    }

    #[tokio::test]
    async fn abort_before_start_dispatches_nothing() {
        let pool = WorkerPool::new(2).expect("pool");
        let abort = AbortSignal::new();
        abort.abort();
        let report = run_batch(&pool, &exam(2), &PipelineConfig::default(), &abort, None)
            .await
            .expect("batch");
        assert_eq!(report.not_dispatched, 20);
        assert_eq!(report.settled(), 0);
        assert_eq!(pool.stats().completed, 0);
    }

    #[tokio::test]
    async fn abort_mid_batch_stops_further_dispatch() {
        let pool = WorkerPool::new(1).expect("pool");
        let pages = exam(2);
        let abort = AbortSignal::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let on_first = abort.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, BatchEvent::Completed(_)) {
                    on_first.abort();
                }
            }
        });

        let report = run_batch(&pool, &pages, &PipelineConfig::default(), &abort, Some(&tx))
            .await
            .expect("batch");
        drop(tx);
        listener.await.expect("listener");

        assert!(report.not_dispatched > 0, "{report:?}");
        assert!(report.settled() < 20);
        assert_eq!(report.settled() + report.not_dispatched, 20);
        assert!(report.failures.is_empty());
        pool.on_idle().await;
        assert_eq!(pool.stats().completed as usize, report.images.len());
    }

    #[tokio::test]
    async fn dispatch_waits_for_a_free_worker() {
        let pool = WorkerPool::new(2).expect("pool");
        let mut rx = pool.subscribe();
        let peak = tokio::spawn(async move {
            let mut peak = 0;
            while rx.changed().await.is_ok() {
                let stats = *rx.borrow_and_update();
                peak = peak.max(stats.queued);
                if stats.completed == 10 {
                    break;
                }
            }
            peak
        });
        let report = run_at_pool(&pool, &exam(1)).await;
        assert_eq!(report.images.len(), 10);
        assert_eq!(peak.await.expect("watcher"), 0);
    }

    #[tokio::test]
    async fn lost_collector_is_a_systemic_failure() {
        let mut collectors: JoinSet<Result<Option<QuestionImage>>> = JoinSet::new();
        let lost = collectors.spawn(async { panic!("collector lost") });
        let question = QuestionRef {
            file_id: "exam.pdf".into(),
            question_id: "3".into(),
        };
        let mut in_flight = HashMap::from([(lost.id(), question.clone())]);
        let joined = collectors.join_next_with_id().await.expect("one collector");
        assert!(joined.is_err());

        let mut tally = Tally::default();
        let events = std::sync::Mutex::new(Vec::new());
        tally.fold(joined, &mut in_flight, &|event| {
            events.lock().expect("events").push(event)
        });

        assert!(in_flight.is_empty());
        assert_eq!(tally.failures.len(), 1);
        assert_eq!(tally.failures[0].question, question);
        assert_eq!(tally.failures[0].kind, FailureKind::Systemic);
        assert!(matches!(
            events.lock().expect("events").as_slice(),
            [BatchEvent::Failed(_)]
        ));
    }

    #[tokio::test]
    async fn progress_events_cover_every_question() {
        let pool = WorkerPool::new(3).expect("pool");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = PipelineConfig::default();
        let report = run_batch(&pool, &exam(1), &config, &AbortSignal::new(), Some(&tx))
            .await
            .expect("batch");
        drop(tx);

        let mut dispatched = 0;
        let mut completed = 0;
        let mut finished = None;
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Dispatched(_) => dispatched += 1,
                BatchEvent::Completed(_) => completed += 1,
                BatchEvent::Finished { images, .. } => finished = Some(images),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(dispatched, 10);
        assert_eq!(completed, 10);
        assert_eq!(finished, Some(report.images.len()));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let pool = WorkerPool::new(1).expect("pool");
        let config = PipelineConfig {
            output_format: OutputFormat::Jpeg { quality: 0 },
            ..PipelineConfig::default()
        };
        let result = run_batch(&pool, &exam(1), &config, &AbortSignal::new(), None).await;
        assert!(result.is_err());
    }

    #[test]
    fn numeric_ids_sort_numerically() {
        let image = |id: &str, page: u32| QuestionImage {
            id: id.into(),
            file_id: "f".into(),
            page_number: page,
            width: 1,
            height: 1,
            format: ImageFormat::Png,
            data: Vec::new(),
            original: None,
            digest: String::new(),
        };
        let mut images = vec![
            image("p1-c0", 1),
            image("10", 1),
            image("2", 1),
            image("1", 2),
            image("2.5", 1),
        ];
        images.sort_by(presentation_order);
        let ids: Vec<_> = images.iter().map(|img| img.id.as_str()).collect();
        assert_eq!(ids, ["2", "2.5", "10", "p1-c0", "1"]);
    }
}
