use std::fmt;

use crate::{
    input::Data,
    work::*,
};

impl WorkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl BackoffPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based),
    /// clamped to `cap_ms`.
    pub fn delay_for(&self, attempt: i64, base_ms: i64, cap_ms: i64) -> i64 {
        let n = attempt.max(1);
        let raw = match self {
            Self::Linear => base_ms.saturating_mul(n),
            Self::Exponential => {
                // 2^62 already saturates any sane cap; keep the shift in range.
                let shift = (n - 1).min(62) as u32;
                match 1i64.checked_shl(shift) {
                    Some(factor) => base_ms.saturating_mul(factor),
                    None => i64::MAX,
                }
            }
        };
        raw.min(cap_ms)
    }
}

impl WorkRequest {
    pub fn one_shot(class_key: impl Into<String>) -> Self {
        Self {
            kind: WorkKind::OneShot,
            class_key: class_key.into(),
            .. Default::default()
        }
    }

    pub fn periodic(class_key: impl Into<String>, period_ms: i64, flex_ms: i64) -> Self {
        Self {
            kind: WorkKind::Periodic,
            class_key: class_key.into(),
            period_ms: Some(period_ms),
            flex_ms: Some(flex_ms),
            .. Default::default()
        }
    }
}

impl Default for WorkRequest {
    fn default() -> Self {
        Self {
            kind: WorkKind::OneShot,
            class_key: String::new(),
            input: Data::default(),
            constraints: Default::default(),
            initial_delay_ms: 0,
            period_ms: None,
            flex_ms: None,
            backoff_policy: BackoffPolicy::default(),
            backoff_base_ms: 30_000,
            backoff_cap_ms: 5 * 3600 * 1000,
            tags: Vec::new(),
            prereqs: Vec::new(),
            input_merger: InputMerger::default(),
        }
    }
}

impl InputMerger {
    /// Combine the record's own input with its prerequisites' outputs,
    /// in prerequisite enumeration order, at activation time.
    pub fn merge(&self, own: Data, outputs: impl IntoIterator<Item = Data>) -> Data {
        let sources = std::iter::once(own).chain(outputs);
        match self {
            Self::Overwrite => Data::overwrite_merge(sources),
            Self::ArrayCollecting => Data::array_collect_merge(sources),
        }
    }
}

/// Conventional payload recorded when the engine itself fails a record.
pub(crate) fn error_output(message: impl Into<String>) -> Data {
    Data::new().with("error", message.into())
}

impl Work {
    /// Compute the transition for a finished attempt. Pure; the store
    /// applies the result atomically.
    pub fn plan_transition(
        &self,
        disposition: Disposition,
        now_ts: i64,
        panic_is_retry: bool,
    ) -> Transition {
        match disposition {
            Disposition::Cancelled => Transition::Cancel,
            Disposition::MissingWorker => Transition::Fail {
                output: error_output(
                    format!("no worker registered for class key: {}", self.class_key)
                ),
            },
            Disposition::Panicked(message) => {
                if panic_is_retry {
                    self.plan_retry(now_ts)
                } else {
                    Transition::Fail { output: error_output(message) }
                }
            }
            Disposition::Success(output) => match self.kind {
                WorkKind::OneShot => Transition::Succeed { output },
                WorkKind::Periodic => self.plan_next_period(),
            },
            Disposition::Failure(output) => match self.kind {
                WorkKind::OneShot => Transition::Fail { output },
                // Periodic records never fail terminally; the period
                // closes without an output.
                WorkKind::Periodic => self.plan_next_period(),
            },
            Disposition::Retry => self.plan_retry(now_ts),
        }
    }

    fn plan_retry(&self, now_ts: i64) -> Transition {
        let delay = self.backoff_policy.delay_for(
            self.attempt,
            self.backoff_base_ms,
            self.backoff_cap_ms,
        );
        let mut next_run_ts = now_ts.saturating_add(delay);
        if self.kind == WorkKind::Periodic {
            // A periodic retry may not spill past the current period
            // boundary.
            let boundary = self.period_anchor_ts.unwrap_or(self.created_ts)
                .saturating_add(self.period_ms.unwrap_or(0));
            next_run_ts = next_run_ts.min(boundary);
        }
        Transition::Retry { next_run_ts }
    }

    fn plan_next_period(&self) -> Transition {
        let period = self.period_ms.unwrap_or(0);
        let flex = self.flex_ms.unwrap_or(0);
        let anchor_ts = self.period_anchor_ts.unwrap_or(self.created_ts)
            .saturating_add(period);
        Transition::NextPeriod {
            anchor_ts,
            next_run_ts: anchor_ts.saturating_add(period - flex),
        }
    }

    pub fn snapshot(&self) -> WorkSnapshot {
        WorkSnapshot {
            id: self.id,
            state: self.state,
            attempt: self.attempt,
            run_count: self.run_count,
            tags: self.tags.clone(),
            unique_name: self.unique_name.clone(),
            progress: None,
            output: self.output.clone(),
        }
    }
}

impl From<&Work> for WorkSnapshot {
    fn from(work: &Work) -> Self {
        work.snapshot()
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{} [{}]", self.id, self.class_key)
    }
}

impl WorkFilter {
    pub fn by_id(id: i64) -> Self {
        Self { ids: vec![id], .. Default::default() }
    }

    pub fn by_tag(tag: impl Into<String>) -> Self {
        Self { tags: vec![tag.into()], .. Default::default() }
    }

    pub fn by_unique_name(name: impl Into<String>) -> Self {
        Self { unique_names: vec![name.into()], .. Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.tags.is_empty()
            && self.unique_names.is_empty()
            && self.states.is_empty()
    }

    /// Match against the identifying parts of a record or snapshot.
    pub fn matches_parts(
        &self,
        id: i64,
        state: WorkState,
        tags: &[String],
        unique_name: Option<&str>,
    ) -> bool {
        (self.ids.is_empty() || self.ids.contains(&id))
            && (self.states.is_empty() || self.states.contains(&state))
            && (self.tags.is_empty()
                || self.tags.iter().any(|t| tags.iter().any(|wt| wt == t)))
            && (self.unique_names.is_empty()
                || unique_name
                    .map(|n| self.unique_names.iter().any(|un| un == n))
                    .unwrap_or(false))
    }

    pub fn matches(&self, work: &Work) -> bool {
        self.matches_parts(
            work.id,
            work.state,
            &work.tags,
            work.unique_name.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::input::{Data, Value};
    use crate::work::*;

    fn one_shot(attempt: i64) -> Work {
        Work {
            id: 1,
            class_key: "upload".into(),
            backoff_policy: BackoffPolicy::Linear,
            backoff_base_ms: 10_000,
            backoff_cap_ms: 5 * 3600 * 1000,
            state: WorkState::Running,
            attempt,
            created_ts: 1_000,
            .. Default::default()
        }
    }

    fn periodic(anchor_ts: i64) -> Work {
        Work {
            id: 2,
            kind: WorkKind::Periodic,
            class_key: "sync".into(),
            period_ms: Some(3_600_000),
            flex_ms: Some(900_000),
            backoff_policy: BackoffPolicy::Linear,
            backoff_base_ms: 10_000,
            backoff_cap_ms: 5 * 3600 * 1000,
            state: WorkState::Running,
            attempt: 1,
            period_anchor_ts: Some(anchor_ts),
            created_ts: anchor_ts,
            .. Default::default()
        }
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let policy = BackoffPolicy::Linear;
        assert_eq!(policy.delay_for(1, 10_000, i64::MAX), 10_000);
        assert_eq!(policy.delay_for(2, 10_000, i64::MAX), 20_000);
        assert_eq!(policy.delay_for(3, 10_000, i64::MAX), 30_000);
    }

    #[test]
    fn exponential_backoff_doubles() {
        let policy = BackoffPolicy::Exponential;
        assert_eq!(policy.delay_for(1, 10_000, i64::MAX), 10_000);
        assert_eq!(policy.delay_for(2, 10_000, i64::MAX), 20_000);
        assert_eq!(policy.delay_for(3, 10_000, i64::MAX), 40_000);
        assert_eq!(policy.delay_for(4, 10_000, i64::MAX), 80_000);
    }

    #[test]
    fn backoff_clamps_at_cap() {
        let cap = 5 * 3600 * 1000;
        assert_eq!(BackoffPolicy::Exponential.delay_for(40, 10_000, cap), cap);
        assert_eq!(BackoffPolicy::Linear.delay_for(100_000, 10_000, cap), cap);
        // large attempt counts must not overflow
        assert_eq!(BackoffPolicy::Exponential.delay_for(i64::MAX, 10_000, cap), cap);
    }

    #[test]
    fn retry_transition_applies_backoff() {
        let work = one_shot(2);
        let transition = work.plan_transition(Disposition::Retry, 50_000, true);
        assert_eq!(transition, Transition::Retry { next_run_ts: 70_000 });
    }

    #[test]
    fn success_transition_one_shot() {
        let work = one_shot(1);
        let output = Data::new().with("x", 1i64);
        let transition = work.plan_transition(
            Disposition::Success(output.clone()), 50_000, true,
        );
        assert_eq!(transition, Transition::Succeed { output });
    }

    #[test]
    fn periodic_success_advances_anchor() {
        let work = periodic(0);
        let transition = work.plan_transition(
            Disposition::Success(Data::default()), 2_800_000, true,
        );
        assert_eq!(transition, Transition::NextPeriod {
            anchor_ts: 3_600_000,
            next_run_ts: 3_600_000 + 2_700_000,
        });
    }

    #[test]
    fn periodic_failure_closes_period() {
        let work = periodic(0);
        let transition = work.plan_transition(
            Disposition::Failure(Data::new().with("error", "nope")), 2_800_000, true,
        );
        assert!(matches!(transition, Transition::NextPeriod { .. }));
    }

    #[test]
    fn periodic_retry_caps_at_period_boundary() {
        let work = periodic(0);
        // 10s after a failure at t=3_595_000 would exceed the
        // 3_600_000 boundary.
        let transition = work.plan_transition(Disposition::Retry, 3_595_000, true);
        assert_eq!(transition, Transition::Retry { next_run_ts: 3_600_000 });
    }

    #[test]
    fn panic_respects_retry_policy() {
        let work = one_shot(1);
        let retried = work.plan_transition(
            Disposition::Panicked("boom".into()), 50_000, true,
        );
        assert_eq!(retried, Transition::Retry { next_run_ts: 60_000 });

        let failed = work.plan_transition(
            Disposition::Panicked("boom".into()), 50_000, false,
        );
        match failed {
            Transition::Fail { output } => {
                assert_eq!(output.get("error"), Some(&Value::Str("boom".into())));
            }
            other => panic!("unexpected transition: {other:?}"),
        }
    }

    #[test]
    fn missing_worker_fails_with_error_output() {
        let work = one_shot(1);
        let transition = work.plan_transition(Disposition::MissingWorker, 0, true);
        match transition {
            Transition::Fail { output } => {
                assert_eq!(output.get("error"), Some(&Value::Str(
                    "no worker registered for class key: upload".into()
                )));
            }
            other => panic!("unexpected transition: {other:?}"),
        }
    }

    #[test]
    fn filter_matches_any_of_groups() {
        let work = Work {
            id: 7,
            tags: vec!["sync".into(), "media".into()],
            unique_name: Some("nightly".into()),
            state: WorkState::Enqueued,
            .. Default::default()
        };
        assert!(WorkFilter::default().matches(&work));
        assert!(WorkFilter::by_id(7).matches(&work));
        assert!(!WorkFilter::by_id(8).matches(&work));
        assert!(WorkFilter::by_tag("media").matches(&work));
        assert!(WorkFilter::by_unique_name("nightly").matches(&work));
        let filter = WorkFilter {
            tags: vec!["media".into()],
            states: vec![WorkState::Running],
            .. Default::default()
        };
        assert!(!filter.matches(&work));
    }
}
