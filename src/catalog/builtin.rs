//! Built-in Airflow 1.10 -> 2.x migration tables

use super::constructs::{ConstructMatch, ConstructRule};
use super::dag_context::DagContextRule;
use super::imports::ImportMapping;
use super::params::{ParamAction, ParamMapping};
use crate::diagnostic::Severity;

pub fn import_mappings() -> Vec<ImportMapping> {
    vec![
        ImportMapping::new("AF101", "airflow.operators.bash_operator", "airflow.operators.bash")
            .named("bash-operator-module"),
        ImportMapping::new("AF102", "airflow.operators.python_operator", "airflow.operators.python")
            .named("python-operator-module"),
        ImportMapping::new("AF103", "airflow.operators.dummy_operator", "airflow.operators.empty")
            .named("dummy-operator")
            .rename("DummyOperator", "EmptyOperator"),
        ImportMapping::new(
            "AF104",
            "airflow.operators.dagrun_operator",
            "airflow.operators.trigger_dagrun",
        )
        .named("trigger-dagrun-module"),
        ImportMapping::new("AF105", "airflow.operators.email_operator", "airflow.operators.email")
            .named("email-operator-module"),
        ImportMapping::new(
            "AF106",
            "airflow.sensors.external_task_sensor",
            "airflow.sensors.external_task",
        )
        .named("external-task-sensor-module"),
        ImportMapping::new("AF107", "airflow.hooks.base_hook", "airflow.hooks.base")
            .named("base-hook-module"),
        ImportMapping::new(
            "AF108",
            "airflow.contrib.operators.ssh_operator",
            "airflow.providers.ssh.operators.ssh",
        )
        .named("contrib-ssh-operator")
        .severity(Severity::Error),
        ImportMapping::new(
            "AF109",
            "airflow.contrib.hooks.aws_hook",
            "airflow.providers.amazon.aws.hooks.base_aws",
        )
        .named("contrib-aws-hook")
        .rename("AwsHook", "AwsBaseHook")
        .severity(Severity::Error),
        ImportMapping::new(
            "AF110",
            "airflow.operators.http_operator",
            "airflow.providers.http.operators.http",
        )
        .named("http-operator-module"),
        ImportMapping::new(
            "AF111",
            "airflow.contrib.operators.kubernetes_pod_operator",
            "airflow.providers.cncf.kubernetes.operators.kubernetes_pod",
        )
        .named("contrib-kubernetes-pod-operator")
        .severity(Severity::Error),
        ImportMapping::new(
            "AF112",
            "airflow.operators.latest_only_operator",
            "airflow.operators.latest_only",
        )
        .named("latest-only-operator-module"),
    ]
    .into_iter()
    .map(|m| ImportMapping {
        since: Some("2.0".to_string()),
        ..m
    })
    .collect()
}

pub fn param_mappings() -> Vec<ParamMapping> {
    vec![
        ParamMapping::new(
            "AF201",
            &["PythonOperator", "BranchPythonOperator", "ShortCircuitOperator"],
            "provide_context",
            ParamAction::Drop,
        )
        .named("provide-context"),
        ParamMapping::new(
            "AF202",
            &["BashOperator"],
            "xcom_push",
            ParamAction::Rename("do_xcom_push".into()),
        )
        .named("bash-xcom-push")
        .severity(Severity::Error),
        ParamMapping::new(
            "AF203",
            &["DAG"],
            "schedule_interval",
            ParamAction::Rename("schedule".into()),
        )
        .named("schedule-interval")
        .position(2),
        ParamMapping::new(
            "AF204",
            &["DAG"],
            "concurrency",
            ParamAction::Rename("max_active_tasks".into()),
        )
        .named("dag-concurrency"),
        ParamMapping::new(
            "AF205",
            &["*Operator", "*Sensor"],
            "task_concurrency",
            ParamAction::Rename("max_active_tis_per_dag".into()),
        )
        .named("task-concurrency"),
        ParamMapping::new(
            "AF206",
            &["TriggerDagRunOperator"],
            "python_callable",
            ParamAction::Manual,
        )
        .named("trigger-dagrun-callable")
        .severity(Severity::Error)
        .note("TriggerDagRunOperator no longer accepts a callable; compute the payload up front and pass it as `conf`"),
    ]
    .into_iter()
    .map(|m| ParamMapping {
        since: Some("2.0".to_string()),
        ..m
    })
    .collect()
}

pub fn construct_rules() -> Vec<ConstructRule> {
    vec![
        ConstructRule::new(
            "AF401",
            "subdag-operator",
            ConstructMatch::Call(vec!["SubDagOperator".into()]),
            "SubDagOperator is deprecated and unreliable under the new scheduler; replace it with a TaskGroup",
        )
        .severity(Severity::Error)
        .suggestion("with TaskGroup(group_id=...):"),
        ConstructRule::new(
            "AF402",
            "contrib-import",
            ConstructMatch::ImportPrefix("airflow.contrib".into()),
            "the airflow.contrib package was removed; import from the matching provider package",
        )
        .severity(Severity::Error),
        ConstructRule::new(
            "AF403",
            "apply-defaults",
            ConstructMatch::Decorator(vec!["apply_defaults".into()]),
            "@apply_defaults is applied automatically and can be removed",
        )
        .severity(Severity::Warning),
        ConstructRule::new(
            "AF404",
            "days-ago",
            ConstructMatch::Call(vec!["days_ago".into()]),
            "days_ago is deprecated; use a fixed pendulum datetime for start_date",
        )
        .severity(Severity::Info)
        .suggestion("pendulum.datetime(2021, 1, 1, tz=\"UTC\")"),
    ]
    .into_iter()
    .map(|r| ConstructRule {
        since: Some("2.0".to_string()),
        ..r
    })
    .collect()
}

pub fn dag_context() -> DagContextRule {
    DagContextRule::default()
}
