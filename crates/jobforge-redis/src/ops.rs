//! Translates a backend-agnostic `IndexWriteSet` into the flat operation
//! list the compare-and-set Lua script applies, and the script itself.
//!
//! `signature-by-state`/`recurring-refs-by-state` are modeled as sorted
//! sets whose score is the refcount rather than a plain Redis set: a
//! `ZINCRBY` that crosses zero removes the member, giving refcounted
//! membership without a round trip to read-then-write the count from
//! Rust.

use jobforge_core::IndexDelta;
use serde::Serialize;

use crate::keys;

#[derive(Serialize)]
#[serde(tag = "op")]
pub enum RedisOp {
    #[serde(rename = "zadd")]
    ZAdd { key: String, score: i64, member: String },
    #[serde(rename = "zrem")]
    ZRem { key: String, member: String },
    /// `delta` of -1/+1; the script removes the member if the resulting
    /// score is less than or equal to zero.
    #[serde(rename = "zincr")]
    ZIncr { key: String, delta: i64, member: String },
}

pub fn lower(prefix: &str, delta: &IndexDelta) -> RedisOp {
    match delta {
        IndexDelta::StateQueueAdd { state, job_id, score_micros } => RedisOp::ZAdd {
            key: keys::queue(prefix, *state),
            score: *score_micros,
            member: job_id.to_string(),
        },
        IndexDelta::StateQueueRemove { state, job_id } => RedisOp::ZRem {
            key: keys::queue(prefix, *state),
            member: job_id.to_string(),
        },
        IndexDelta::ScheduledAdd { job_id, score_micros } => RedisOp::ZAdd {
            key: keys::scheduled(prefix),
            score: *score_micros,
            member: job_id.to_string(),
        },
        IndexDelta::ScheduledRemove { job_id } => RedisOp::ZRem {
            key: keys::scheduled(prefix),
            member: job_id.to_string(),
        },
        IndexDelta::SignatureIncrement { state, signature } => RedisOp::ZIncr {
            key: keys::job_details(prefix, *state),
            delta: 1,
            member: signature.clone(),
        },
        IndexDelta::SignatureDecrement { state, signature } => RedisOp::ZIncr {
            key: keys::job_details(prefix, *state),
            delta: -1,
            member: signature.clone(),
        },
        IndexDelta::RecurringRefIncrement { state, recurring_job_id } => RedisOp::ZIncr {
            key: keys::recurring_ref(prefix, *state),
            delta: 1,
            member: recurring_job_id.clone(),
        },
        IndexDelta::RecurringRefDecrement { state, recurring_job_id } => RedisOp::ZIncr {
            key: keys::recurring_ref(prefix, *state),
            delta: -1,
            member: recurring_job_id.clone(),
        },
    }
}

/// `KEYS[1]` = job key, `KEYS[2]` = job version key.
/// `ARGV[1]` = expected version ("0" for insert), `ARGV[2]` = new version,
/// `ARGV[3]` = job JSON, `ARGV[4]` = JSON-encoded array of `RedisOp`.
///
/// Returns `{1}` on success, `{0, <stored job JSON or false>}` on a version
/// conflict (index ops are never applied in that branch).
pub const SAVE_JOB_SCRIPT: &str = r#"
local job_key = KEYS[1]
local version_key = KEYS[2]
local expected = tonumber(ARGV[1])
local new_version = ARGV[2]
local job_json = ARGV[3]
local ops = cjson.decode(ARGV[4])

local current = redis.call('GET', version_key)
local current_version = current and tonumber(current) or 0

if current_version ~= expected then
    local stored = redis.call('GET', job_key)
    return {0, stored or false}
end

redis.call('SET', job_key, job_json)
redis.call('SET', version_key, new_version)

for _, op in ipairs(ops) do
    if op.op == 'zadd' then
        redis.call('ZADD', op.key, op.score, op.member)
    elseif op.op == 'zrem' then
        redis.call('ZREM', op.key, op.member)
    elseif op.op == 'zincr' then
        local newscore = redis.call('ZINCRBY', op.key, op.delta, op.member)
        if tonumber(newscore) <= 0 then
            redis.call('ZREM', op.key, op.member)
        end
    end
end

return {1}
"#;

/// `KEYS[1]` = job key, `KEYS[2]` = job version key.
/// `ARGV[1]` = JSON-encoded array of `RedisOp` (always removals).
/// Returns the number of primary keys actually deleted (0 or 1).
pub const DELETE_JOB_SCRIPT: &str = r#"
local job_key = KEYS[1]
local version_key = KEYS[2]
local ops = cjson.decode(ARGV[1])

local removed = redis.call('DEL', job_key, version_key)

for _, op in ipairs(ops) do
    if op.op == 'zrem' then
        redis.call('ZREM', op.key, op.member)
    elseif op.op == 'zincr' then
        local newscore = redis.call('ZINCRBY', op.key, op.delta, op.member)
        if tonumber(newscore) <= 0 then
            redis.call('ZREM', op.key, op.member)
        end
    end
end

if removed > 0 then
    return 1
else
    return 0
end
"#;
