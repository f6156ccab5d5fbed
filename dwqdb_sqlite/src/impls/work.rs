use async_trait::async_trait;
use dwqcore::{
    error::{
        work::WorkError,
        BackendError,
    },
    input::Data,
    work::{
        traits::WorkBackend,
        BackoffPolicy,
        IngestOutcome,
        InputMerger,
        NewWork,
        Transition,
        UniquePolicy,
        Work,
        WorkFilter,
        WorkKind,
        WorkState,
    },
};
use sqlx::{
    sqlite::SqliteRow,
    QueryBuilder,
    Row,
    Sqlite,
    SqliteConnection,
};
use std::collections::HashSet;

use crate::{
    chrono::Utc,
    SqliteBackend,
};

const WORK_COLUMNS: &str = "\
id, kind, class_key, input, constraints, initial_delay_ms, period_ms, \
flex_ms, backoff_policy, backoff_base_ms, backoff_cap_ms, unique_name, \
input_merger, state, attempt, run_count, period_anchor_ts, next_run_ts, \
output, created_ts, last_run_ts, completed_ts";

fn invariant(message: impl Into<String>) -> BackendError {
    BackendError::AppInvariantViolation(message.into())
}

fn data_to_json(data: &Data) -> Result<String, BackendError> {
    serde_json::to_string(data)
        .map_err(|e| invariant(format!("unserializable payload: {e}")))
}

fn work_from_row(row: &SqliteRow) -> Result<Work, BackendError> {
    let input: String = row.try_get("input")?;
    let constraints: String = row.try_get("constraints")?;
    let output: Option<String> = row.try_get("output")?;
    Ok(Work {
        id: row.try_get("id")?,
        kind: WorkKind::try_from(row.try_get::<i64, _>("kind")?)
            .map_err(|e| invariant(format!("invalid work kind: {e}")))?,
        class_key: row.try_get("class_key")?,
        input: serde_json::from_str(&input)
            .map_err(|e| invariant(format!("undecodable input: {e}")))?,
        constraints: serde_json::from_str(&constraints)
            .map_err(|e| invariant(format!("undecodable constraints: {e}")))?,
        initial_delay_ms: row.try_get("initial_delay_ms")?,
        period_ms: row.try_get("period_ms")?,
        flex_ms: row.try_get("flex_ms")?,
        backoff_policy: BackoffPolicy::try_from(row.try_get::<i64, _>("backoff_policy")?)
            .map_err(|e| invariant(format!("invalid backoff policy: {e}")))?,
        backoff_base_ms: row.try_get("backoff_base_ms")?,
        backoff_cap_ms: row.try_get("backoff_cap_ms")?,
        unique_name: row.try_get("unique_name")?,
        input_merger: InputMerger::try_from(row.try_get::<i64, _>("input_merger")?)
            .map_err(|e| invariant(format!("invalid input merger: {e}")))?,
        state: WorkState::try_from(row.try_get::<i64, _>("state")?)
            .map_err(|e| invariant(format!("invalid work state: {e}")))?,
        attempt: row.try_get("attempt")?,
        run_count: row.try_get("run_count")?,
        period_anchor_ts: row.try_get("period_anchor_ts")?,
        next_run_ts: row.try_get("next_run_ts")?,
        output: output
            .map(|o| serde_json::from_str(&o))
            .transpose()
            .map_err(|e| invariant(format!("undecodable output: {e}")))?,
        created_ts: row.try_get("created_ts")?,
        last_run_ts: row.try_get("last_run_ts")?,
        completed_ts: row.try_get("completed_ts")?,
        tags: Vec::new(),
        prereqs: Vec::new(),
    })
}

async fn attach_relations(
    sqlite: &SqliteBackend,
    work: &mut Work,
) -> Result<(), BackendError> {
    work.tags = sqlx::query(
        "SELECT tag FROM work_tag WHERE work_id = ?1 ORDER BY id",
    )
        .bind(work.id)
        .fetch_all(&*sqlite.pool)
        .await?
        .iter()
        .map(|row| row.try_get("tag"))
        .collect::<Result<Vec<String>, _>>()?;
    work.prereqs = sqlx::query(
        "SELECT prereq_id FROM work_prereq WHERE work_id = ?1 ORDER BY id",
    )
        .bind(work.id)
        .fetch_all(&*sqlite.pool)
        .await?
        .iter()
        .map(|row| row.try_get("prereq_id"))
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(())
}

async fn hydrate(
    sqlite: &SqliteBackend,
    rows: Vec<SqliteRow>,
) -> Result<Vec<Work>, BackendError> {
    let mut works = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let mut work = work_from_row(row)?;
        attach_relations(sqlite, &mut work).await?;
        works.push(work);
    }
    Ok(works)
}

/// Cancel `root` and walk its transitive dependents within the open
/// transaction. Returns the ids whose state actually changed.
async fn cancel_cascade_tx(
    conn: &mut SqliteConnection,
    root: i64,
    now_ts: i64,
) -> Result<Vec<i64>, BackendError> {
    let mut changed = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut frontier = vec![root];
    while let Some(id) = frontier.pop() {
        let affected = sqlx::query(
            "
UPDATE
    work
SET
    state = ?2,
    output = NULL,
    completed_ts = ?3
WHERE
    id = ?1
    AND state IN (0, 1, 2)
            ",
        )
            .bind(id)
            .bind(i64::from(WorkState::Cancelled))
            .bind(now_ts)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        let cascades = if affected > 0 {
            changed.push(id);
            true
        } else {
            // already terminal; only a failed/cancelled prerequisite
            // takes its dependents down with it.
            let state: Option<i64> = sqlx::query(
                "SELECT state FROM work WHERE id = ?1",
            )
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|row| row.try_get("state"))
                .transpose()?;
            matches!(
                state.map(WorkState::try_from),
                Some(Ok(WorkState::Failed)) | Some(Ok(WorkState::Cancelled))
            )
        };
        if !cascades {
            continue;
        }
        let dependents = sqlx::query(
            "SELECT work_id FROM work_prereq WHERE prereq_id = ?1",
        )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        for row in dependents.iter() {
            let dependent: i64 = row.try_get("work_id")?;
            if seen.insert(dependent) {
                frontier.push(dependent);
            }
        }
    }
    Ok(changed)
}

/// Records among `live` that no other live record waits on; appended
/// work chains onto these.
async fn chain_leaves_tx(
    conn: &mut SqliteConnection,
    live: &[i64],
) -> Result<Vec<i64>, BackendError> {
    let mut referenced = HashSet::new();
    for id in live {
        let rows = sqlx::query(
            "SELECT prereq_id FROM work_prereq WHERE work_id = ?1",
        )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        for row in rows.iter() {
            referenced.insert(row.try_get::<i64, _>("prereq_id")?);
        }
    }
    let leaves: Vec<i64> = live.iter()
        .filter(|id| !referenced.contains(id))
        .copied()
        .collect();
    if leaves.is_empty() {
        Ok(live.to_vec())
    } else {
        Ok(leaves)
    }
}

async fn insert_work_sqlite(
    sqlite: &SqliteBackend,
    new_work: NewWork,
) -> Result<IngestOutcome, WorkError> {
    let NewWork { request, unique_name, policy } = new_work;
    let now_ts = Utc::now().timestamp_millis();
    let mut tx = sqlite.pool.begin().await
        .map_err(BackendError::from)?;

    let mut displaced_ids: Vec<i64> = Vec::new();
    let mut prereqs = request.prereqs.clone();

    if let Some(name) = unique_name.as_deref() {
        let live: Vec<i64> = sqlx::query(
            "
SELECT
    id
FROM
    work
WHERE
    unique_name = ?1
    AND state IN (0, 1, 2)
ORDER BY
    id
            ",
        )
            .bind(name)
            .fetch_all(&mut *tx)
            .await
            .map_err(BackendError::from)?
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()
            .map_err(BackendError::from)?;
        if !live.is_empty() {
            match policy {
                None => {
                    return Err(WorkError::Backend(invariant(format!(
                        "unique name {name} already live; a policy is required"
                    ))));
                }
                Some(UniquePolicy::Keep) => {
                    return Ok(IngestOutcome::Existing(live[0]));
                }
                Some(UniquePolicy::Replace) => {
                    for id in live {
                        displaced_ids.extend(
                            cancel_cascade_tx(&mut *tx, id, now_ts).await?
                        );
                    }
                }
                Some(UniquePolicy::Append)
                | Some(UniquePolicy::AppendOrReplace) => {
                    for leaf in chain_leaves_tx(&mut *tx, &live).await? {
                        if !prereqs.contains(&leaf) {
                            prereqs.push(leaf);
                        }
                    }
                }
            }
        }
    }

    for prereq in prereqs.iter() {
        let found = sqlx::query("SELECT id FROM work WHERE id = ?1")
            .bind(prereq)
            .fetch_optional(&mut *tx)
            .await
            .map_err(BackendError::from)?;
        if found.is_none() {
            return Err(WorkError::UnknownPrereq(*prereq));
        }
    }

    let state = if prereqs.is_empty() {
        WorkState::Enqueued
    } else {
        WorkState::Blocked
    };
    let (period_anchor_ts, next_run_ts) = match request.kind {
        WorkKind::Periodic => {
            let period = request.period_ms.unwrap_or(0);
            let flex = request.flex_ms.unwrap_or(0);
            (Some(now_ts), now_ts + (period - flex))
        }
        WorkKind::OneShot => (None, now_ts + request.initial_delay_ms),
    };
    let input_json = data_to_json(&request.input)?;
    let constraints_json = serde_json::to_string(&request.constraints)
        .map_err(|e| invariant(format!("unserializable constraints: {e}")))?;

    let id = sqlx::query(
        "
INSERT INTO work (
    kind,
    class_key,
    input,
    constraints,
    initial_delay_ms,
    period_ms,
    flex_ms,
    backoff_policy,
    backoff_base_ms,
    backoff_cap_ms,
    unique_name,
    input_merger,
    state,
    attempt,
    run_count,
    period_anchor_ts,
    next_run_ts,
    created_ts
)
VALUES ( ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, 0, ?14, ?15, ?16 )\
        ",
    )
        .bind(i64::from(request.kind))
        .bind(&request.class_key)
        .bind(&input_json)
        .bind(&constraints_json)
        .bind(request.initial_delay_ms)
        .bind(request.period_ms)
        .bind(request.flex_ms)
        .bind(i64::from(request.backoff_policy))
        .bind(request.backoff_base_ms)
        .bind(request.backoff_cap_ms)
        .bind(unique_name.as_deref())
        .bind(i64::from(request.input_merger))
        .bind(i64::from(state))
        .bind(period_anchor_ts)
        .bind(next_run_ts)
        .bind(now_ts)
        .execute(&mut *tx)
        .await
        .map_err(BackendError::from)?
        .last_insert_rowid();

    for tag in request.tags.iter() {
        sqlx::query(
            "INSERT INTO work_tag ( work_id, tag ) VALUES ( ?1, ?2 )",
        )
            .bind(id)
            .bind(tag)
            .execute(&mut *tx)
            .await
            .map_err(BackendError::from)?;
    }
    for prereq in prereqs.iter() {
        sqlx::query(
            "INSERT INTO work_prereq ( work_id, prereq_id ) VALUES ( ?1, ?2 )",
        )
            .bind(id)
            .bind(prereq)
            .execute(&mut *tx)
            .await
            .map_err(BackendError::from)?;
    }

    tx.commit().await.map_err(BackendError::from)?;

    let work = Work {
        id,
        kind: request.kind,
        class_key: request.class_key,
        input: request.input,
        constraints: request.constraints,
        initial_delay_ms: request.initial_delay_ms,
        period_ms: request.period_ms,
        flex_ms: request.flex_ms,
        backoff_policy: request.backoff_policy,
        backoff_base_ms: request.backoff_base_ms,
        backoff_cap_ms: request.backoff_cap_ms,
        tags: request.tags,
        unique_name,
        prereqs,
        input_merger: request.input_merger,
        state,
        attempt: 0,
        run_count: 0,
        period_anchor_ts,
        next_run_ts,
        output: None,
        created_ts: now_ts,
        last_run_ts: None,
        completed_ts: None,
    };
    let mut displaced = Vec::with_capacity(displaced_ids.len());
    for displaced_id in displaced_ids {
        if let Some(work) = gets_work_sqlite(sqlite, displaced_id).await? {
            displaced.push(work);
        }
    }
    Ok(IngestOutcome::Created { work, displaced })
}

async fn gets_work_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Option<Work>, BackendError> {
    let row = sqlx::query(
        &format!("SELECT {WORK_COLUMNS} FROM work WHERE id = ?1"),
    )
        .bind(id)
        .fetch_optional(&*sqlite.pool)
        .await?;
    match row {
        Some(row) => {
            let mut work = work_from_row(&row)?;
            attach_relations(sqlite, &mut work).await?;
            Ok(Some(work))
        }
        None => Ok(None),
    }
}

async fn list_by_tag_sqlite(
    sqlite: &SqliteBackend,
    tag: &str,
) -> Result<Vec<Work>, BackendError> {
    let rows = sqlx::query(
        &format!(
            "
SELECT
    {WORK_COLUMNS}
FROM
    work
WHERE
    id IN (SELECT work_id FROM work_tag WHERE tag = ?1)
ORDER BY
    id
            ",
        ),
    )
        .bind(tag)
        .fetch_all(&*sqlite.pool)
        .await?;
    hydrate(sqlite, rows).await
}

async fn list_by_unique_name_sqlite(
    sqlite: &SqliteBackend,
    name: &str,
) -> Result<Vec<Work>, BackendError> {
    let rows = sqlx::query(
        &format!(
            "SELECT {WORK_COLUMNS} FROM work WHERE unique_name = ?1 ORDER BY id",
        ),
    )
        .bind(name)
        .fetch_all(&*sqlite.pool)
        .await?;
    hydrate(sqlite, rows).await
}

async fn query_works_sqlite(
    sqlite: &SqliteBackend,
    filter: &WorkFilter,
) -> Result<Vec<Work>, BackendError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        format!("SELECT {WORK_COLUMNS} FROM work WHERE 1 = 1"),
    );
    if !filter.ids.is_empty() {
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in filter.ids.iter() {
            separated.push_bind(id);
        }
        builder.push(")");
    }
    if !filter.tags.is_empty() {
        builder.push(" AND id IN (SELECT work_id FROM work_tag WHERE tag IN (");
        let mut separated = builder.separated(", ");
        for tag in filter.tags.iter() {
            separated.push_bind(tag);
        }
        builder.push("))");
    }
    if !filter.unique_names.is_empty() {
        builder.push(" AND unique_name IN (");
        let mut separated = builder.separated(", ");
        for name in filter.unique_names.iter() {
            separated.push_bind(name);
        }
        builder.push(")");
    }
    if !filter.states.is_empty() {
        builder.push(" AND state IN (");
        let mut separated = builder.separated(", ");
        for state in filter.states.iter() {
            separated.push_bind(i64::from(*state));
        }
        builder.push(")");
    }
    builder.push(" ORDER BY id");
    let rows = builder.build()
        .fetch_all(&*sqlite.pool)
        .await?;
    hydrate(sqlite, rows).await
}

async fn list_due_sqlite(
    sqlite: &SqliteBackend,
    now_ts: i64,
) -> Result<Vec<Work>, BackendError> {
    let rows = sqlx::query(
        &format!(
            "
SELECT
    {WORK_COLUMNS}
FROM
    work
WHERE
    state = 0
    AND next_run_ts <= ?1
ORDER BY
    next_run_ts,
    attempt,
    created_ts,
    id
            ",
        ),
    )
        .bind(now_ts)
        .fetch_all(&*sqlite.pool)
        .await?;
    hydrate(sqlite, rows).await
}

async fn list_blocked_sqlite(
    sqlite: &SqliteBackend,
) -> Result<Vec<Work>, BackendError> {
    let rows = sqlx::query(
        &format!("SELECT {WORK_COLUMNS} FROM work WHERE state = 1 ORDER BY id"),
    )
        .fetch_all(&*sqlite.pool)
        .await?;
    hydrate(sqlite, rows).await
}

async fn claim_work_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Option<Work>, BackendError> {
    let now_ts = Utc::now().timestamp_millis();
    let affected = sqlx::query(
        "
UPDATE
    work
SET
    state = 2,
    attempt = attempt + 1,
    last_run_ts = ?2
WHERE
    id = ?1
    AND state = 0
        ",
    )
        .bind(id)
        .bind(now_ts)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Ok(None);
    }
    gets_work_sqlite(sqlite, id).await
}

async fn apply_transition_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    transition: &Transition,
) -> Result<Option<Work>, BackendError> {
    let now_ts = Utc::now().timestamp_millis();
    let affected = match transition {
        Transition::Succeed { output } => sqlx::query(
            "
UPDATE
    work
SET
    state = 3,
    output = ?2,
    run_count = run_count + 1,
    completed_ts = ?3
WHERE
    id = ?1
    AND state = 2
            ",
        )
            .bind(id)
            .bind(data_to_json(output)?)
            .bind(now_ts)
            .execute(&*sqlite.pool)
            .await?
            .rows_affected(),
        Transition::Fail { output } => sqlx::query(
            "
UPDATE
    work
SET
    state = 4,
    output = ?2,
    completed_ts = ?3
WHERE
    id = ?1
    AND state = 2
            ",
        )
            .bind(id)
            .bind(data_to_json(output)?)
            .bind(now_ts)
            .execute(&*sqlite.pool)
            .await?
            .rows_affected(),
        Transition::Retry { next_run_ts } => sqlx::query(
            "
UPDATE
    work
SET
    state = 0,
    next_run_ts = ?2,
    output = NULL
WHERE
    id = ?1
    AND state = 2
            ",
        )
            .bind(id)
            .bind(next_run_ts)
            .execute(&*sqlite.pool)
            .await?
            .rows_affected(),
        Transition::NextPeriod { anchor_ts, next_run_ts } => sqlx::query(
            "
UPDATE
    work
SET
    state = 0,
    attempt = 0,
    run_count = run_count + 1,
    period_anchor_ts = ?2,
    next_run_ts = ?3,
    output = NULL
WHERE
    id = ?1
    AND state = 2
            ",
        )
            .bind(id)
            .bind(anchor_ts)
            .bind(next_run_ts)
            .execute(&*sqlite.pool)
            .await?
            .rows_affected(),
        Transition::Cancel => sqlx::query(
            "
UPDATE
    work
SET
    state = 5,
    output = NULL,
    completed_ts = ?2
WHERE
    id = ?1
    AND state = 2
            ",
        )
            .bind(id)
            .bind(now_ts)
            .execute(&*sqlite.pool)
            .await?
            .rows_affected(),
    };
    if affected == 0 {
        return Ok(None);
    }
    gets_work_sqlite(sqlite, id).await
}

async fn promote_blocked_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    input: &Data,
) -> Result<Option<Work>, BackendError> {
    let affected = sqlx::query(
        "
UPDATE
    work
SET
    state = 0,
    input = ?2
WHERE
    id = ?1
    AND state = 1
        ",
    )
        .bind(id)
        .bind(data_to_json(input)?)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Ok(None);
    }
    gets_work_sqlite(sqlite, id).await
}

async fn cancel_cascade_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Vec<Work>, BackendError> {
    let now_ts = Utc::now().timestamp_millis();
    let mut tx = sqlite.pool.begin().await?;
    let changed = cancel_cascade_tx(&mut *tx, id, now_ts).await?;
    tx.commit().await?;
    let mut works = Vec::with_capacity(changed.len());
    for id in changed {
        if let Some(work) = gets_work_sqlite(sqlite, id).await? {
            works.push(work);
        }
    }
    Ok(works)
}

async fn prereq_states_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Vec<(i64, WorkState)>, BackendError> {
    sqlx::query(
        "
SELECT
    p.prereq_id,
    w.state
FROM
    work_prereq p
JOIN
    work w ON w.id = p.prereq_id
WHERE
    p.work_id = ?1
ORDER BY
    p.id
        ",
    )
        .bind(id)
        .fetch_all(&*sqlite.pool)
        .await?
        .iter()
        .map(|row| {
            let prereq_id: i64 = row.try_get("prereq_id")?;
            let state: i64 = row.try_get("state")?;
            Ok((
                prereq_id,
                WorkState::try_from(state)
                    .map_err(|e| invariant(format!("invalid work state: {e}")))?,
            ))
        })
        .collect()
}

async fn prereq_outputs_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Vec<Data>, BackendError> {
    sqlx::query(
        "
SELECT
    w.output
FROM
    work_prereq p
JOIN
    work w ON w.id = p.prereq_id
WHERE
    p.work_id = ?1
ORDER BY
    p.id
        ",
    )
        .bind(id)
        .fetch_all(&*sqlite.pool)
        .await?
        .iter()
        .map(|row| {
            let output: Option<String> = row.try_get("output")?;
            match output {
                Some(output) => serde_json::from_str(&output)
                    .map_err(|e| invariant(format!("undecodable output: {e}"))),
                None => Ok(Data::default()),
            }
        })
        .collect()
}

async fn recover_interrupted_sqlite(
    sqlite: &SqliteBackend,
) -> Result<Vec<Work>, BackendError> {
    let mut tx = sqlite.pool.begin().await?;
    let interrupted: Vec<i64> = sqlx::query(
        "SELECT id FROM work WHERE state = 2 ORDER BY id",
    )
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.try_get("id"))
        .collect::<Result<_, _>>()?;
    sqlx::query("UPDATE work SET state = 0 WHERE state = 2")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    let mut works = Vec::with_capacity(interrupted.len());
    for id in interrupted {
        if let Some(work) = gets_work_sqlite(sqlite, id).await? {
            works.push(work);
        }
    }
    Ok(works)
}

async fn next_wake_ts_sqlite(
    sqlite: &SqliteBackend,
) -> Result<Option<i64>, BackendError> {
    let row = sqlx::query(
        "SELECT MIN(next_run_ts) AS next_wake_ts FROM work WHERE state = 0",
    )
        .fetch_one(&*sqlite.pool)
        .await?;
    Ok(row.try_get("next_wake_ts")?)
}

async fn prune_terminal_sqlite(
    sqlite: &SqliteBackend,
    cutoff_ts: i64,
) -> Result<u64, BackendError> {
    // terminal records still named as a prerequisite of live work are
    // retained so blocked resolution keeps seeing their state.
    const PRUNABLE: &str = "\
SELECT id FROM work \
WHERE state IN (3, 4, 5) \
AND completed_ts IS NOT NULL \
AND completed_ts < ?1 \
AND id NOT IN (\
    SELECT p.prereq_id FROM work_prereq p \
    JOIN work d ON d.id = p.work_id \
    WHERE d.state IN (0, 1, 2)\
)";
    let mut tx = sqlite.pool.begin().await?;
    sqlx::query(
        &format!("DELETE FROM work_tag WHERE work_id IN ({PRUNABLE})"),
    )
        .bind(cutoff_ts)
        .execute(&mut *tx)
        .await?;
    // the repeated ?1 refers to the same bound cutoff
    sqlx::query(
        &format!(
            "DELETE FROM work_prereq WHERE work_id IN ({PRUNABLE}) \
             OR prereq_id IN ({PRUNABLE})",
        ),
    )
        .bind(cutoff_ts)
        .execute(&mut *tx)
        .await?;
    let affected = sqlx::query(
        &format!("DELETE FROM work WHERE id IN ({PRUNABLE})"),
    )
        .bind(cutoff_ts)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(affected)
}

#[async_trait]
impl WorkBackend for SqliteBackend {
    async fn insert_work(
        &self,
        new_work: NewWork,
    ) -> Result<IngestOutcome, WorkError> {
        insert_work_sqlite(&self, new_work).await
    }
    async fn get_work(
        &self,
        id: i64,
    ) -> Result<Option<Work>, BackendError> {
        gets_work_sqlite(&self, id).await
    }
    async fn list_by_tag(
        &self,
        tag: &str,
    ) -> Result<Vec<Work>, BackendError> {
        list_by_tag_sqlite(&self, tag).await
    }
    async fn list_by_unique_name(
        &self,
        name: &str,
    ) -> Result<Vec<Work>, BackendError> {
        list_by_unique_name_sqlite(&self, name).await
    }
    async fn query_works(
        &self,
        filter: &WorkFilter,
    ) -> Result<Vec<Work>, BackendError> {
        query_works_sqlite(&self, filter).await
    }
    async fn list_due(
        &self,
        now_ts: i64,
    ) -> Result<Vec<Work>, BackendError> {
        list_due_sqlite(&self, now_ts).await
    }
    async fn list_blocked(
        &self,
    ) -> Result<Vec<Work>, BackendError> {
        list_blocked_sqlite(&self).await
    }
    async fn claim_work(
        &self,
        id: i64,
    ) -> Result<Option<Work>, BackendError> {
        claim_work_sqlite(&self, id).await
    }
    async fn apply_transition(
        &self,
        id: i64,
        transition: &Transition,
    ) -> Result<Option<Work>, BackendError> {
        apply_transition_sqlite(&self, id, transition).await
    }
    async fn promote_blocked(
        &self,
        id: i64,
        input: &Data,
    ) -> Result<Option<Work>, BackendError> {
        promote_blocked_sqlite(&self, id, input).await
    }
    async fn cancel_cascade(
        &self,
        id: i64,
    ) -> Result<Vec<Work>, BackendError> {
        cancel_cascade_sqlite(&self, id).await
    }
    async fn prereq_states(
        &self,
        id: i64,
    ) -> Result<Vec<(i64, WorkState)>, BackendError> {
        prereq_states_sqlite(&self, id).await
    }
    async fn prereq_outputs(
        &self,
        id: i64,
    ) -> Result<Vec<Data>, BackendError> {
        prereq_outputs_sqlite(&self, id).await
    }
    async fn recover_interrupted(
        &self,
    ) -> Result<Vec<Work>, BackendError> {
        recover_interrupted_sqlite(&self).await
    }
    async fn next_wake_ts(
        &self,
    ) -> Result<Option<i64>, BackendError> {
        next_wake_ts_sqlite(&self).await
    }
    async fn prune_terminal(
        &self,
        cutoff_ts: i64,
    ) -> Result<u64, BackendError> {
        prune_terminal_sqlite(&self, cutoff_ts).await
    }
}
