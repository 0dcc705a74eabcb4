//! End-to-end controller flows through the JSON tool surface.

use std::sync::Arc;

use md_monitor::monitor::{keys, MonitorRegistry};
use md_monitor::sink::{JsonlSink, MetricsSink};
use md_monitor::tools::ToolBox;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::common::{memory_sink, values_of, EdrWriter, SimDir, TERMS};

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("Failed to read metrics")
        .lines()
        .map(|l| serde_json::from_str(l).expect("metrics line is JSON"))
        .collect()
}

#[tokio::test]
async fn test_offline_run_from_init_to_stop() {
    let sim = SimDir::new();
    sim.write_energy(&[0, 100, 200]);
    sim.append(&sim.colvar(), "#! FIELDS time phi\n0.000 -1.2\n0.200 -1.1\n");
    sim.append_hills(2);

    let root = TempDir::new().unwrap();
    let sink: Arc<dyn MetricsSink> = Arc::new(JsonlSink::new(root.path()));
    let tools = ToolBox::new("ctrl", Arc::new(MonitorRegistry::new()), sink);

    let init = tools
        .dispatch(
            "tracking_init_run",
            json!({"project": "ala2", "run_name": "metad-300K", "tags": ["metad"]}),
        )
        .await;
    assert_eq!(init["status"], "initialized");
    let run_id = init["run_id"].as_str().expect("run_id").to_string();
    let run_dir = root.path().join("ala2").join(&run_id);

    let started = tools
        .dispatch(
            "start_background_monitor",
            json!({
                "log_file": sim.log(),
                "edr_file": sim.edr(),
                "colvar_file": sim.colvar(),
                "hills_file": sim.hills(),
                "energy_terms": TERMS,
                "poll_interval_s": 3600.0,
            }),
        )
        .await;
    assert_eq!(started["status"], "started");
    assert_eq!(started["poll_interval_s"], 3600.0);
    assert_eq!(started["monitored_paths"].as_array().map(Vec::len), Some(4));
    assert!(tools.registry().is_active("ctrl"));

    let stopped = tools.dispatch("stop_monitor", json!({"final_flush": true})).await;
    assert_eq!(stopped, json!({"status": "stopped", "flushed": true}));
    assert!(!tools.registry().is_active("ctrl"));

    let lines = read_lines(&run_dir.join("metrics.jsonl"));
    let energy_steps: Vec<i64> = lines
        .iter()
        .filter(|l| l.get("Potential").is_some())
        .filter_map(|l| l[keys::STEP].as_i64())
        .collect();
    assert_eq!(energy_steps, vec![0, 100, 200]);
    let colvar_steps: Vec<i64> = lines
        .iter()
        .filter(|l| l.get("phi").is_some())
        .filter_map(|l| l[keys::STEP].as_i64())
        .collect();
    assert_eq!(colvar_steps, vec![0, 100]);
    let hills: Vec<i64> = lines
        .iter()
        .filter_map(|l| l.get(keys::DEPOSITION_COUNT).and_then(Value::as_i64))
        .collect();
    assert_eq!(hills, vec![2]);
    assert!(lines.iter().all(|l| l["_timestamp"].is_string()));

    let record: Value =
        serde_json::from_slice(&std::fs::read(run_dir.join("run.json")).unwrap()).unwrap();
    assert_eq!(record["name"], "metad-300K");
    assert_eq!(record["tags"], json!(["metad"]));
    assert!(record["ended_at"].is_string());

    let again = tools.dispatch("stop_monitor", Value::Null).await;
    assert_eq!(again, json!({"status": "not_running"}));
}

#[tokio::test]
async fn test_start_before_init_reports_error() {
    let sim = SimDir::new();
    let root = TempDir::new().unwrap();
    let sink: Arc<dyn MetricsSink> = Arc::new(JsonlSink::new(root.path()));
    let tools = ToolBox::new("ctrl", Arc::new(MonitorRegistry::new()), sink);

    let result = tools
        .dispatch(
            "start_background_monitor",
            json!({"log_file": sim.log(), "edr_file": sim.edr()}),
        )
        .await;
    assert_eq!(result["status"], "error");
    assert_eq!(result["tool"], "start_background_monitor");
    assert!(!tools.registry().is_active("ctrl"));
}

#[tokio::test]
async fn test_sessions_share_registry_independently() {
    let sim = SimDir::new();
    let (_sink, dyn_sink) = memory_sink();
    let registry = Arc::new(MonitorRegistry::new());
    let a = ToolBox::new("a", Arc::clone(&registry), Arc::clone(&dyn_sink));
    let b = ToolBox::new("b", Arc::clone(&registry), dyn_sink);
    let args = json!({"log_file": sim.log(), "edr_file": sim.edr(), "poll_interval_s": 3600.0});

    assert_eq!(a.dispatch("start_background_monitor", args.clone()).await["status"], "started");
    assert_eq!(b.dispatch("start_background_monitor", args.clone()).await["status"], "started");
    assert_eq!(a.dispatch("start_background_monitor", args).await["status"], "error");
    assert_eq!(registry.active_sessions(), vec!["a".to_string(), "b".to_string()]);

    let stopped = a.dispatch("stop_monitor", json!({"final_flush": false})).await;
    assert_eq!(stopped, json!({"status": "stopped", "flushed": false}));
    assert_eq!(registry.active_sessions(), vec!["b".to_string()]);
    b.dispatch("stop_monitor", json!({})).await;
    assert!(registry.active_sessions().is_empty());
}

#[tokio::test]
async fn test_log_energy_after_offset() {
    let sim = SimDir::new();
    let mut writer = EdrWriter::new(&TERMS);
    for step in [0, 500, 1000, 1500] {
        writer.frame(step, &[-1.0, 2.0, 300.0]);
    }
    std::fs::write(sim.edr(), writer.bytes()).unwrap();
    let (sink, dyn_sink) = memory_sink();
    let tools = ToolBox::new("ctrl", Arc::new(MonitorRegistry::new()), dyn_sink);

    let result = tools
        .dispatch(
            "tracking_log_energy",
            json!({"edr_file": sim.edr(), "energy_terms": ["Temperature"], "step_offset": 500}),
        )
        .await;
    assert_eq!(
        result,
        json!({"status": "logged", "logged_steps": 2, "last_step": 1500})
    );
    assert_eq!(values_of(&sink, keys::STEP), vec![1000, 1500]);
    assert!(sink.emitted().iter().all(|m| !m.contains_key("Potential")));
}

#[test]
fn test_every_tool_has_object_schema() {
    let defs = ToolBox::definitions();
    assert_eq!(defs.len(), 5);
    for def in &defs {
        assert_eq!(def.input_schema["type"], "object", "{}", def.name);
        assert!(!def.description.is_empty());
    }
}
