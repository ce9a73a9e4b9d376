mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Script, jsonwp, registry, scripted, w3c};
use serde_json::json;
use umbra::protocol::{Protocol, SessionId, WireError};
use umbra::runtime::{Error, ResolutionFailure, ServerArgs};
use umbra::{CleanupOptions, UmbrellaDriver};

fn umbrella(script: &Arc<Script>) -> UmbrellaDriver {
	UmbrellaDriver::with_registry(ServerArgs::default(), registry(script))
}

async fn wait_until_gone(umbrella: &UmbrellaDriver, id: &SessionId) {
	tokio::time::timeout(Duration::from_secs(2), async {
		while umbrella.session_exists(id).await {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("session was never removed");
}

#[tokio::test]
async fn w3c_session_is_committed_with_settings() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let created = umbrella
		.create_session(w3c(json!({
			"platformName": "Fake",
			"appium:app": "/tmp/app.zip",
			"appium:settings[ignoreUnimportantViews]": true
		})))
		.await
		.into_result()
		.unwrap();

	assert_eq!(created.protocol, Protocol::W3c);
	assert!(created.capabilities.get("settings[ignoreUnimportantViews]").is_none());
	assert!(umbrella.session_exists(&created.session_id).await);
	assert!(!umbrella.has_pending());

	let settings = umbrella
		.execute_command("getSettings", vec![json!(created.session_id.as_str())])
		.await;
	assert_eq!(settings.protocol, Some(Protocol::W3c));
	assert_eq!(settings.into_result().unwrap(), json!({"ignoreUnimportantViews": true}));
}

#[tokio::test]
async fn jsonwp_session_gets_jsonwp_settings() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let envelope = umbrella
		.create_session(jsonwp(json!({"platformName": "Fake", "settings[waitForIdleTimeout]": 10})))
		.await;
	assert_eq!(envelope.protocol, Some(Protocol::Jsonwp));
	let created = envelope.into_result().unwrap();

	let settings = umbrella
		.execute_command("getSettings", vec![json!(created.session_id.as_str())])
		.await
		.into_result()
		.unwrap();
	assert_eq!(settings, json!({"waitForIdleTimeout": 10}));
}

#[tokio::test]
async fn operator_defaults_fill_the_request() {
	let args = ServerArgs {
		default_capabilities: common::caps(json!({"platformName": "Fake", "settings[shouldUseCompactResponses]": false})),
		..Default::default()
	};
	let umbrella = UmbrellaDriver::new(args);
	let created = umbrella
		.create_session(w3c(json!({"appium:deviceName": "emulator"})))
		.await
		.into_result()
		.unwrap();
	assert_eq!(created.capabilities["platformName"], json!("Fake"));

	let settings = umbrella
		.execute_command("getSettings", vec![json!(created.session_id.as_str())])
		.await
		.into_result()
		.unwrap();
	assert_eq!(settings, json!({"shouldUseCompactResponses": false}));
}

#[tokio::test]
async fn missing_platform_name_is_an_error_envelope() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let envelope = umbrella.create_session(w3c(json!({"appium:app": "x"}))).await;
	assert_eq!(envelope.protocol, Some(Protocol::W3c));
	let err = envelope.into_result().unwrap_err();
	assert!(matches!(err, Error::MissingCapability(_)));
	assert_eq!(err.code(), "invalid argument");
	assert!(umbrella.sessions().await.is_empty());
}

#[tokio::test]
async fn unknown_engine_reports_find_failure() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let err = umbrella
		.create_session(w3c(json!({"platformName": "Android", "appium:automationName": "Nonexistent"})))
		.await
		.into_result()
		.unwrap_err();
	assert_eq!(err.resolution_failure(), Some(ResolutionFailure::Find));
	assert!(err.to_string().contains("check your desired capabilities"));
}

#[tokio::test]
async fn uninstalled_engine_reports_load_failure() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let err = umbrella
		.create_session(w3c(json!({"platformName": "iOS", "appium:platformVersion": "12.0"})))
		.await
		.into_result()
		.unwrap_err();
	assert_eq!(err.resolution_failure(), Some(ResolutionFailure::Load));
	assert!(err.to_string().contains("verify your server installation"));
}

#[tokio::test]
async fn capability_conflicts_surface_as_parse_errors() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let request = serde_json::from_value(json!({"capabilities": {
		"alwaysMatch": {"platformName": "Fake"},
		"firstMatch": [{"platformName": "Android"}]
	}}))
	.unwrap();
	let envelope = umbrella.create_session(request).await;
	assert_eq!(envelope.protocol, Some(Protocol::W3c));
	assert!(matches!(envelope.into_result(), Err(Error::CapabilityParse(_))));
}

#[tokio::test]
async fn concurrent_creations_both_commit() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let (a, b) = tokio::join!(
		umbrella.create_session(w3c(json!({"platformName": "Fake", "appium:deviceName": "a"}))),
		umbrella.create_session(jsonwp(json!({"platformName": "fake", "deviceName": "b"}))),
	);
	let a = a.into_result().unwrap();
	let b = b.into_result().unwrap();
	assert_ne!(a.session_id, b.session_id);

	let ids: HashSet<SessionId> = umbrella.sessions().await.into_iter().map(|s| s.id).collect();
	assert_eq!(ids, HashSet::from([a.session_id, b.session_id]));
}

#[tokio::test]
async fn same_type_creations_see_each_others_pending_data() {
	let script = Script::with_barrier(2);
	let umbrella = umbrella(&script);
	let (a, b) = tokio::join!(
		umbrella.create_session(scripted(json!({}))),
		umbrella.create_session(scripted(json!({}))),
	);
	assert!(a.is_ok() && b.is_ok());

	let seen = script.seen_siblings.lock().clone();
	assert_eq!(seen.len(), 2);
	let mut observed: Vec<Vec<_>> = seen.into_iter().collect();
	observed.sort_by_key(|siblings| siblings.first().map(|d| d["index"].as_u64()));
	assert_eq!(observed[0], vec![json!({"index": 0})]);
	assert_eq!(observed[1], vec![json!({"index": 1})]);
	assert!(!umbrella.has_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_stays_visible_between_backend_create_and_commit() {
	let script = Script::with_commit_gate();
	let umbrella = Arc::new(umbrella(&script));
	let gate = script.commit_gate.as_ref().unwrap();

	let first = tokio::spawn({
		let umbrella = Arc::clone(&umbrella);
		async move { umbrella.create_session(scripted(json!({}))).await }
	});
	gate.parked.notified().await;
	assert!(umbrella.has_pending());
	assert!(umbrella.sessions().await.is_empty());

	let second = tokio::spawn({
		let umbrella = Arc::clone(&umbrella);
		async move { umbrella.create_session(scripted(json!({}))).await }
	});
	assert!(first.await.unwrap().is_ok());
	assert!(second.await.unwrap().is_ok());

	let seen = script.seen_siblings.lock().clone();
	assert_eq!(seen, vec![vec![], vec![json!({"index": 0})]]);
	assert_eq!(umbrella.sessions().await.len(), 2);
	assert!(!umbrella.has_pending());
}

#[tokio::test]
async fn settings_follow_the_negotiated_protocol_when_backend_reports_none() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	let created = umbrella
		.create_session(scripted(json!({
			"noProtocol": true,
			"appium:settings[trackScrollEvents]": false
		})))
		.await
		.into_result()
		.unwrap();

	assert_eq!(created.protocol, Protocol::W3c);
	let applied = script.settings.lock().clone();
	assert_eq!(applied.len(), 1);
	assert_eq!(applied[0].get("trackScrollEvents"), Some(&json!(false)));
}

#[tokio::test]
async fn rejected_settings_leave_the_session_committed() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	let envelope = umbrella
		.create_session(scripted(json!({
			"rejectSettings": true,
			"appium:settings[trackScrollEvents]": false
		})))
		.await;

	assert_eq!(envelope.protocol, Some(Protocol::W3c));
	assert!(matches!(envelope.into_result(), Err(Error::Backend(_))));
	let sessions = umbrella.sessions().await;
	assert_eq!(sessions.len(), 1);
	assert_eq!(sessions[0].id, SessionId::new("scripted-0"));
	assert!(!umbrella.has_pending());
}

#[tokio::test]
async fn committed_siblings_are_passed_to_new_sessions() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	umbrella.create_session(scripted(json!({}))).await.into_result().unwrap();
	umbrella.create_session(scripted(json!({}))).await.into_result().unwrap();

	let seen = script.seen_siblings.lock().clone();
	assert!(seen[0].is_empty());
	assert_eq!(seen[1], vec![json!({"index": 0})]);
}

#[tokio::test]
async fn sibling_without_data_blocks_creation() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	umbrella.create_session(scripted(json!({"hideData": true}))).await.into_result().unwrap();

	let err = umbrella.create_session(scripted(json!({}))).await.into_result().unwrap_err();
	assert!(matches!(err, Error::SessionNotCreated(_)));
	assert!(err.to_string().contains("Problem getting session data for driver type ScriptedDriver"));
	assert_eq!(umbrella.sessions().await.len(), 1);
}

#[tokio::test]
async fn failed_backend_creation_releases_pending_entry() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	let err = umbrella
		.create_session(scripted(json!({"failCreate": true})))
		.await
		.into_result()
		.unwrap_err();
	assert!(matches!(err, Error::Backend(_)));
	assert_eq!(err.code(), "session not created");
	assert!(!umbrella.has_pending());
	assert!(umbrella.sessions().await.is_empty());
}

#[tokio::test]
async fn duplicate_session_ids_are_rejected() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	umbrella
		.create_session(scripted(json!({"fixedId": "same"})))
		.await
		.into_result()
		.unwrap();
	let err = umbrella
		.create_session(scripted(json!({"fixedId": "same"})))
		.await
		.into_result()
		.unwrap_err();
	assert!(matches!(err, Error::SessionNotCreated(_)));
	assert_eq!(umbrella.sessions().await.len(), 1);
	assert_eq!(script.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unique_app_refuses_to_share() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	umbrella
		.create_session(w3c(json!({"platformName": "Fake", "appium:uniqueApp": true})))
		.await
		.into_result()
		.unwrap();
	let err = umbrella
		.create_session(w3c(json!({"platformName": "Fake"})))
		.await
		.into_result()
		.unwrap_err();
	assert!(err.to_string().contains("another unique session"));
}

#[tokio::test]
async fn session_override_replaces_existing_sessions() {
	let umbrella = UmbrellaDriver::new(ServerArgs {
		session_override: true,
		..Default::default()
	});
	let first = umbrella
		.create_session(w3c(json!({"platformName": "Fake"})))
		.await
		.into_result()
		.unwrap();
	let second = umbrella
		.create_session(w3c(json!({"platformName": "Fake"})))
		.await
		.into_result()
		.unwrap();
	assert!(!umbrella.session_exists(&first.session_id).await);
	assert!(umbrella.session_exists(&second.session_id).await);
}

#[tokio::test]
async fn delete_session_removes_before_teardown() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	let created = umbrella
		.create_session(scripted(json!({"failDelete": true})))
		.await
		.into_result()
		.unwrap();

	let envelope = umbrella.delete_session(&created.session_id).await;
	assert_eq!(envelope.protocol, Some(Protocol::W3c));
	assert!(matches!(envelope.into_result(), Err(Error::Backend(_))));
	assert!(!umbrella.session_exists(&created.session_id).await);

	let again = umbrella.delete_session(&created.session_id).await;
	assert!(again.into_result().unwrap_err().is_unknown_session());
}

#[tokio::test]
async fn delete_all_isolates_failures() {
	let script = Arc::new(Script::default());
	let umbrella = umbrella(&script);
	for extra in [json!({}), json!({"failDelete": true}), json!({})] {
		umbrella.create_session(scripted(extra)).await.into_result().unwrap();
	}

	let report = umbrella.delete_all_sessions(CleanupOptions::default()).await;
	assert_eq!(report.attempted, 3);
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.succeeded(), 2);
	assert_eq!(script.deletes.load(Ordering::SeqCst), 3);
	assert!(umbrella.sessions().await.is_empty());
}

#[tokio::test]
async fn forced_cleanup_aborts_backends() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let created = umbrella
		.create_session(w3c(json!({"platformName": "Fake"})))
		.await
		.into_result()
		.unwrap();

	let report = umbrella
		.delete_all_sessions(CleanupOptions::force("server shutting down"))
		.await;
	assert_eq!(report.attempted, 1);
	assert!(report.failures.is_empty());
	wait_until_gone(&umbrella, &created.session_id).await;
}

#[tokio::test]
async fn crash_removes_session_without_delete() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	let created = umbrella
		.create_session(w3c(json!({"platformName": "Fake"})))
		.await
		.into_result()
		.unwrap();

	let crashed = umbrella
		.execute_command("crash", vec![json!("device lost"), json!(created.session_id.as_str())])
		.await;
	assert!(crashed.is_ok());
	wait_until_gone(&umbrella, &created.session_id).await;
}

#[tokio::test]
async fn committed_ids_are_distinct() {
	let umbrella = UmbrellaDriver::new(ServerArgs::default());
	for _ in 0..5 {
		umbrella
			.create_session(w3c(json!({"platformName": "Fake"})))
			.await
			.into_result()
			.unwrap();
	}
	let ids: HashSet<SessionId> = umbrella.sessions().await.into_iter().map(|s| s.id).collect();
	assert_eq!(ids.len(), 5);
}
