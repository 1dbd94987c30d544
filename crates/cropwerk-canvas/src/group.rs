// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Logical question grouping — reassemble per-page detections into questions
// that may span pages or columns.
//
// Ownership of a continuation is decided purely by detection order: it joins
// whichever question is open at that point in the file. There is no geometric
// cross-check.

use std::sync::Arc;

use cropwerk_core::types::{DetectionKind, LogicalQuestion, Page, QuestionPart};
use tracing::{debug, info};

/// Group detections into logical questions.
///
/// Pages are walked file by file (files in order of first appearance), each
/// file by page number, each page in detection order. A normal detection opens
/// a new question; a continuation joins the open question of the same file,
/// or becomes an orphan question of its own when none is open. Every detection
/// ends up in exactly one question.
pub fn group_questions(pages: &[Arc<Page>]) -> Vec<LogicalQuestion> {
    let mut files: Vec<(&str, Vec<&Arc<Page>>)> = Vec::new();
    for page in pages {
        match files.iter_mut().find(|(id, _)| *id == page.file_id) {
            Some((_, list)) => list.push(page),
            None => files.push((page.file_id.as_str(), vec![page])),
        }
    }

    let mut questions = Vec::new();
    for (file_id, mut file_pages) in files {
        file_pages.sort_by_key(|p| p.page_number);
        let before = questions.len();
        group_file(file_id, &file_pages, &mut questions);
        info!(
            file = file_id,
            pages = file_pages.len(),
            questions = questions.len() - before,
            "file grouped into logical questions"
        );
    }
    questions
}

fn group_file(file_id: &str, pages: &[&Arc<Page>], out: &mut Vec<LogicalQuestion>) {
    let mut open: Option<LogicalQuestion> = None;

    for page in pages {
        for (index, detection) in page.detections.iter().enumerate() {
            let part = QuestionPart {
                page: Arc::clone(page),
                detection: detection.clone(),
                index_in_page: index,
            };
            match &detection.kind {
                DetectionKind::Normal(id) => {
                    out.extend(open.take());
                    open = Some(LogicalQuestion {
                        id: id.clone(),
                        file_id: file_id.to_owned(),
                        parts: vec![part],
                    });
                }
                DetectionKind::Continuation => match open.as_mut() {
                    Some(question) => {
                        debug!(
                            question = %question.id,
                            page = page.page_number,
                            index,
                            "continuation attached"
                        );
                        question.parts.push(part);
                    }
                    None => {
                        let id = orphan_id(page.page_number, index);
                        debug!(question = %id, "orphan continuation");
                        open = Some(LogicalQuestion {
                            id,
                            file_id: file_id.to_owned(),
                            parts: vec![part],
                        });
                    }
                },
            }
        }
    }
    out.extend(open);
}

/// Id given to a question that opens with a continuation.
pub fn orphan_id(page_number: u32, index_in_page: usize) -> String {
    format!("p{page_number}-c{index_in_page}")
}
