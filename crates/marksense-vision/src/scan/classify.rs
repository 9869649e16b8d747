// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Question classifier: turns the raw option scores of one question into a
// status, a chosen option and a confidence.

use marksense_core::config::ClassifierPolicy;
use marksense_core::{BubbleSample, QuestionResult, QuestionStatus};

/// Classify one question.
///
/// Options are ranked by score, highest first; on equal scores the earlier
/// option ranks higher. With `top1`/`top2` the two best scores and
/// `margin = top1 - top2`:
///
/// * `top1 < ambiguous` is blank,
/// * `top2 >= marked` is invalid (two genuine marks),
/// * `top2 >= ambiguous && margin < policy.margin` is ambiguous,
/// * anything else is valid.
pub fn classify(index: usize, samples: Vec<BubbleSample>, policy: &ClassifierPolicy) -> QuestionResult {
    let mut ranked: Vec<usize> = (0..samples.len()).collect();
    // Stable, so ties keep layout order.
    ranked.sort_by(|&a, &b| samples[b].score.total_cmp(&samples[a].score));

    let top1 = ranked.first().map_or(0.0, |&i| samples[i].score);
    let top2 = ranked.get(1).map_or(0.0, |&i| samples[i].score);
    let lead = top1 - top2;

    let (status, chosen, confidence) = if top1 < policy.ambiguous {
        (QuestionStatus::Blank, None, 0.0)
    } else if top2 >= policy.marked {
        (QuestionStatus::Invalid, None, 0.0)
    } else if top2 >= policy.ambiguous && lead < policy.margin {
        (QuestionStatus::Ambiguous, Some(ranked[0]), (lead / policy.margin).max(0.0))
    } else {
        (QuestionStatus::Valid, Some(ranked[0]), (lead / (3.0 * policy.margin)).min(1.0))
    };

    QuestionResult {
        index,
        samples,
        status,
        chosen,
        confidence,
    }
}

/// Classify every question of a sheet, in order.
pub fn classify_all(questions: Vec<Vec<BubbleSample>>, policy: &ClassifierPolicy) -> Vec<QuestionResult> {
    questions
        .into_iter()
        .enumerate()
        .map(|(index, samples)| classify(index, samples, policy))
        .collect()
}
