//! Behaviour-driven step definitions driving the ingest CLI scenarios.

use super::helpers::{HARBOUR_KML, Workspace};
use super::*;
use ortho_config::MergeComposer;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use std::cell::RefCell;

/// Aggregates ingest CLI scenario state so each step only needs a single world
/// argument.
#[derive(Debug)]
struct IngestWorld {
    workspace: Workspace,
    source: Utf8PathBuf,
    cli_args: RefCell<Vec<String>>,
    cli_result: RefCell<Option<Result<IngestConfig, CliError>>>,
    config_layer: RefCell<Option<Value>>,
    env_layer: RefCell<Option<Value>>,
}

impl IngestWorld {
    fn new() -> Self {
        let workspace = Workspace::new();
        let source = workspace.root().join("harbour.kml");
        Self {
            workspace,
            source,
            cli_args: RefCell::new(Vec::new()),
            cli_result: RefCell::new(None),
            config_layer: RefCell::new(None),
            env_layer: RefCell::new(None),
        }
    }

    fn config(&self) -> std::cell::Ref<'_, Result<IngestConfig, CliError>> {
        std::cell::Ref::map(self.cli_result.borrow(), |result| {
            result.as_ref().expect("result recorded")
        })
    }
}

#[fixture]
fn world() -> IngestWorld {
    IngestWorld::new()
}

/// Layer CLI values over the recorded file and environment layers.
fn merge_layers(world: &IngestWorld, args: &IngestArgs) -> Result<IngestConfig, CliError> {
    let mut cli = serde_json::to_value(args).expect("serialise CLI args");
    if let Value::Object(fields) = &mut cli {
        fields.retain(|_, value| !value.is_null());
    }
    let mut composer = MergeComposer::new();
    if let Some(file) = world.config_layer.borrow().clone() {
        composer.push_file(file, None);
    }
    if let Some(env) = world.env_layer.borrow().clone() {
        composer.push_environment(env);
    }
    composer.push_cli(cli);
    let merged = IngestArgs::merge_from_layers(composer.layers()).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}

#[given("a KML document exists on disk")]
fn document_exists(#[from(world)] world: &IngestWorld) {
    let written = world.workspace.write("harbour.kml", HARBOUR_KML.as_bytes());
    assert_eq!(written, world.source);
}

#[given("I pass the source and output directory with CLI flags")]
fn cli_provides_paths(#[from(world)] world: &IngestWorld) {
    world.cli_args.borrow_mut().extend([
        format!("--{ARG_SOURCE}"),
        world.source.to_string(),
        format!("--{ARG_OUTPUT_DIR}"),
        world.workspace.output().to_string(),
    ]);
}

#[given("I omit all ingest configuration")]
fn omit_configuration(#[from(world)] world: &IngestWorld) {
    world.cli_args.borrow_mut().clear();
    *world.config_layer.borrow_mut() = None;
    *world.env_layer.borrow_mut() = None;
}

#[given("the output directory and resource prefix are provided via a config file")]
fn provided_via_config(#[from(world)] world: &IngestWorld) {
    *world.config_layer.borrow_mut() = Some(json!({
        "output_dir": world.workspace.root().join("from-file").as_str(),
        "resource_prefix": "icons",
    }));
}

#[given("the output directory is overridden via environment variables")]
fn output_overridden_by_env(#[from(world)] world: &IngestWorld) {
    *world.env_layer.borrow_mut() = Some(json!({
        "output_dir": world.workspace.root().join("from-env").as_str(),
    }));
}

#[given("I pass only the source CLI flag")]
fn cli_only_source(#[from(world)] world: &IngestWorld) {
    world
        .cli_args
        .borrow_mut()
        .extend([format!("--{ARG_SOURCE}"), world.source.to_string()]);
}

#[when("I configure the ingest command")]
fn configure_ingest(#[from(world)] world: &IngestWorld) {
    let mut invocation = vec!["kml-ingest".to_owned(), "ingest".to_owned()];
    invocation.extend(world.cli_args.borrow().iter().cloned());
    let layered = world.config_layer.borrow().is_some() || world.env_layer.borrow().is_some();
    let outcome = Cli::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| match cli.command {
            Command::Ingest(args) if layered => merge_layers(world, &args),
            Command::Ingest(args) => IngestConfig::try_from(args),
        });
    world.cli_result.replace(Some(outcome));
}

#[then("the ingest plan uses the CLI-provided paths")]
fn plan_uses_cli_paths(#[from(world)] world: &IngestWorld) {
    let result = world.config();
    let config = result.as_ref().expect("expected success");
    assert_eq!(config.source, world.source);
    assert_eq!(config.output_dir, world.workspace.output());
    assert_eq!(config.resource_prefix, DEFAULT_RESOURCE_PREFIX);
}

#[then("the CLI reports that the \"source\" flag is missing")]
fn reports_missing_source(#[from(world)] world: &IngestWorld) {
    let result = world.config();
    match result.as_ref().expect_err("expected error") {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_SOURCE),
        other => panic!("unexpected error {other:?}"),
    }
}

#[then("CLI and environment layers override configuration defaults")]
fn precedence_holds(#[from(world)] world: &IngestWorld) {
    let result = world.config();
    let config = result.as_ref().expect("expected success");
    assert_eq!(config.source, world.source);
    assert_eq!(config.output_dir, world.workspace.root().join("from-env"));
    assert_eq!(config.resource_prefix, "icons");
}

macro_rules! register_ingest_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/ingest_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: IngestWorld) {
            let _ = world;
        }
    };
}

register_ingest_scenario!(cli_flag_selection, "selecting the source via CLI flags");
register_ingest_scenario!(rejecting_missing_args, "rejecting missing arguments");
register_ingest_scenario!(
    layering_cli_config_env,
    "layering CLI, config file, and environment values"
);
