use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use uuid::Uuid;

pub const SCHEMA_VERSION: &str = "twt2toot.v1";

#[derive(Debug, Clone, Serialize, Default)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

/// One line of machine-readable output per run. `apply=false` carries a
/// dry-run plan, `apply=true` the result of a live run.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub schema_version: &'static str,
    pub time: DateTime<Utc>,
    pub run_id: Uuid,
    pub op: &'static str,
    pub apply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Envelope {
    pub fn plan<T: Serialize>(op: &'static str, plan: &T, meta: Option<Meta>) -> Result<Self, serde_json::Error> {
        Ok(Envelope {
            schema_version: SCHEMA_VERSION,
            time: Utc::now(),
            run_id: Uuid::new_v4(),
            op,
            apply: false,
            plan: Some(serde_json::to_value(plan)?),
            result: None,
            meta,
        })
    }

    pub fn result<T: Serialize>(op: &'static str, result: &T, meta: Option<Meta>) -> Result<Self, serde_json::Error> {
        Ok(Envelope {
            schema_version: SCHEMA_VERSION,
            time: Utc::now(),
            run_id: Uuid::new_v4(),
            op,
            apply: true,
            plan: None,
            result: Some(serde_json::to_value(result)?),
            meta,
        })
    }
}

pub fn print_plan<T: Serialize>(op: &'static str, plan: &T, meta: Option<Meta>) -> Result<()> {
    write_envelope(&Envelope::plan(op, plan, meta)?)
}

pub fn print_result<T: Serialize>(op: &'static str, result: &T, meta: Option<Meta>) -> Result<()> {
    write_envelope(&Envelope::result(op, result, meta)?)
}

fn write_envelope(env: &Envelope) -> Result<()> {
    let mut out = io::stdout();
    serde_json::to_writer(&mut out, env)?;
    writeln!(&mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_plan_envelope() {
        let plan = json!({"posts": 2});
        let env = Envelope::plan("sync", &plan, None).expect("to serialize plan");
        let s = serde_json::to_string(&env).unwrap();
        assert!(s.contains("\"schema_version\":\"twt2toot.v1\""));
        assert!(s.contains("\"plan\""));
        assert!(s.contains("\"apply\":false"));
        assert!(!s.contains("\"result\""));
    }

    #[test]
    fn serialize_result_envelope_with_meta() {
        let result = json!({"watermark": 42});
        let meta = Meta { duration_ms: Some(12) };
        let env = Envelope::result("sync", &result, Some(meta)).expect("to serialize result");
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["apply"], true);
        assert_eq!(v["result"]["watermark"], 42);
        assert_eq!(v["meta"]["duration_ms"], 12);
    }
}
