use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use asset_combiner::{
  BundleGraph, BundleManifest, BundleRegistry, BundleStatus, CombinerConfig, CombinerError,
  FingerprintKind, PositionHint, PrecompileBuilder,
};
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

fn write(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, content).unwrap();
}

/// Project with sources under `web/` and definitions under `assets/`.
fn project() -> TempDir {
  let temp = tempdir().unwrap();
  let root = temp.path();

  write(root, "web/js/core.js", "var core = 1;");
  write(root, "web/js/widgets.js", "var widgets = 2;");
  write(root, "web/js/admin.js", "var admin = 3;");
  write(root, "web/js/site.js", "var site = 4;");
  write(root, "web/css/core.css", ".core { background: url(../img/bg.png); }");

  write(
    root,
    "assets/core.json",
    r#"{"basePath": "../web", "js": ["js/core.js"], "css": ["css/core.css"]}"#,
  );
  write(
    root,
    "assets/widgets.yaml",
    "basePath: ../web\njs:\n  - js/widgets.js\ndepends:\n  - core\n",
  );
  write(
    root,
    "assets/admin.json",
    r#"{
      "basePath": "../web",
      "js": ["js/admin.js"],
      "depends": ["core", "widgets"],
      "jsOptions": {"defer": true},
      "publishOptions": {"monolith": true}
    }"#,
  );
  write(
    root,
    "assets/site.json",
    r#"{
      "basePath": "../web",
      "js": ["https://cdn.test/jquery.js", "js/site.js"],
      "depends": ["core"]
    }"#,
  );
  temp
}

fn config(root: &Path, precompile_monolith: bool) -> CombinerConfig {
  let mut config = CombinerConfig::default();
  config.precompile_monolith = precompile_monolith;
  config.rebase(root)
}

fn output_file(config: &CombinerConfig, name: &str) -> PathBuf {
  config.output_path.join(name)
}

#[test]
fn monolith_absorbs_its_dependency_closure() {
  let temp = project();
  let root = temp.path();
  let config = config(root, true);
  let artifact = root.join("config/bundles.json");

  let report = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();

  assert_eq!(report.artifact.as_deref(), Some(artifact.as_path()));
  assert_eq!(report.status("admin"), Some(&BundleStatus::Created));
  assert_eq!(report.status("core"), Some(&BundleStatus::Absorbed("admin".into())));
  assert_eq!(report.status("widgets"), Some(&BundleStatus::Absorbed("admin".into())));
  assert_eq!(report.status("site"), Some(&BundleStatus::Created));

  let manifest = BundleManifest::load(&artifact).unwrap();
  let names: Vec<&str> = manifest.bundles.keys().map(String::as_str).collect();
  assert_eq!(names, vec!["admin", "site"]);

  let admin = &manifest.bundles["admin"];
  assert!(admin.publish_options.monolith);
  assert!(admin.publish_options.acc_processed);
  assert_eq!(
    admin.publish_options.acc_included,
    BTreeSet::from(["core".to_string(), "widgets".to_string()])
  );
  assert!(admin.depends.is_empty());
  assert_eq!(manifest.bundles["site"].depends, vec!["admin".to_string()]);
  assert_eq!(admin.base_url, "/assets/ac");
  assert_eq!(admin.js_options.attributes["defer"], serde_json::json!(true));
  assert_eq!(admin.js.len(), 1);
  assert_eq!(admin.css.len(), 1);

  let script = fs::read_to_string(output_file(&config, &admin.js[0])).unwrap();
  let core = script.find("var core").unwrap();
  let widgets = script.find("var widgets").unwrap();
  let own = script.find("var admin").unwrap();
  assert!(core < widgets && widgets < own);

  let styles = fs::read_to_string(output_file(&config, &admin.css[0])).unwrap();
  assert!(styles.contains("url(../../img/bg.png)"));
}

#[test]
fn external_references_precede_the_combined_file() {
  let temp = project();
  let root = temp.path();
  let config = config(root, false);
  let artifact = root.join("config/bundles.json");

  PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();

  let manifest = BundleManifest::load(&artifact).unwrap();
  let site = &manifest.bundles["site"];
  assert_eq!(site.js.len(), 2);
  assert_eq!(site.js[0], "https://cdn.test/jquery.js");
  assert!(site.js[1].ends_with(".js"));
  assert_eq!(site.depends, vec!["core".to_string()]);

  let combined = fs::read_to_string(output_file(&config, &site.js[1])).unwrap();
  assert!(combined.contains("var site"));
  assert!(!combined.contains("jquery"));

  let admin = &manifest.bundles["admin"];
  assert!(admin.publish_options.acc_included.is_empty());
  assert_eq!(admin.depends.len(), 2);
  assert_eq!(manifest.bundles.len(), 4);
}

#[test]
fn second_run_reuses_every_output() {
  let temp = project();
  let root = temp.path();
  let config = config(root, true);
  let artifact = root.join("bundles.json");
  let builder = PrecompileBuilder::from_config(&config).unwrap();

  builder.build(&artifact).unwrap();
  let first = BundleManifest::load(&artifact).unwrap();

  let report = builder.build(&artifact).unwrap();
  assert_eq!(report.status("admin"), Some(&BundleStatus::Unchanged));
  assert_eq!(report.status("site"), Some(&BundleStatus::Unchanged));
  assert_eq!(BundleManifest::load(&artifact).unwrap(), first);
}

#[test]
fn any_failure_leaves_no_configuration_file() {
  let temp = project();
  let root = temp.path();
  write(
    root,
    "assets/broken.json",
    r#"{"basePath": "../web", "js": ["js/missing.js"]}"#,
  );
  let config = config(root, false);
  let artifact = root.join("bundles.json");
  fs::write(&artifact, "stale").unwrap();

  let report = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();

  assert!(report.has_errors());
  assert!(report.artifact.is_none());
  assert!(!artifact.exists());
  assert!(matches!(report.status("broken"), Some(BundleStatus::Failed(_))));
  assert_eq!(report.status("site"), Some(&BundleStatus::Created));
}

#[test]
fn cycles_fail_the_monolith_only() {
  let temp = project();
  let root = temp.path();
  write(root, "assets/loop/a.json", r#"{"depends": ["loop/b"], "publishOptions": {"monolith": true}}"#);
  write(root, "assets/loop/b.json", r#"{"depends": ["loop/a"]}"#);
  let config = config(root, true);

  let report = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&root.join("bundles.json"))
    .unwrap();

  match report.status("loop/a") {
    Some(BundleStatus::Failed(reason)) => assert!(reason.contains("circular dependency")),
    other => panic!("unexpected status: {other:?}"),
  }
  assert_eq!(report.status("admin"), Some(&BundleStatus::Created));
  assert!(report.artifact.is_none());
}

#[test]
fn cycles_abort_dependency_expansion() {
  let temp = project();
  let root = temp.path();
  write(root, "assets/loop/a.json", r#"{"depends": ["loop/b"]}"#);
  write(root, "assets/loop/b.json", r#"{"depends": ["loop/a"]}"#);
  let mut config = config(root, false);
  config.process_dependent = true;

  let err = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&root.join("bundles.json"))
    .unwrap_err();
  assert!(matches!(err, CombinerError::CircularDependency { .. }));
}

#[test]
fn written_configuration_resolves_on_its_own() {
  let temp = project();
  let root = temp.path();
  let config = config(root, true);
  let artifact = root.join("config/bundles.json");

  PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();

  let manifest = BundleManifest::load(&artifact).unwrap();
  let names: Vec<String> = manifest.bundles.keys().cloned().collect();
  let registry = BundleRegistry::from_manifest(manifest);
  for name in &names {
    let mut graph = BundleGraph::new();
    graph.resolve(name, &registry, PositionHint::Free).unwrap();
  }

  let mut graph = BundleGraph::new();
  graph.resolve("site", &registry, PositionHint::Free).unwrap();
  assert_eq!(graph.order(), ["admin".to_string(), "site".to_string()]);
}

#[test]
fn touching_one_input_rebuilds_only_its_bundle() {
  let temp = project();
  let root = temp.path();
  let mut config = config(root, true);
  config.fingerprint = FingerprintKind::Content;
  let artifact = root.join("bundles.json");
  let builder = PrecompileBuilder::from_config(&config).unwrap();

  builder.build(&artifact).unwrap();
  let first = BundleManifest::load(&artifact).unwrap();
  let admin_files: Vec<String> = first.bundles["admin"]
    .js
    .iter()
    .chain(&first.bundles["admin"].css)
    .map(|name| fs::read_to_string(output_file(&config, name)).unwrap())
    .collect();

  write(root, "web/js/site.js", "var site = 5;");
  let report = builder.build(&artifact).unwrap();
  let second = BundleManifest::load(&artifact).unwrap();

  assert_eq!(report.status("site"), Some(&BundleStatus::Created));
  assert_eq!(report.status("admin"), Some(&BundleStatus::Unchanged));
  let created: Vec<&str> = report
    .bundles
    .iter()
    .filter(|outcome| outcome.status == BundleStatus::Created)
    .map(|outcome| outcome.name.as_str())
    .collect();
  assert_eq!(created, vec!["site"]);

  assert_ne!(second.bundles["site"].js[1], first.bundles["site"].js[1]);
  assert_eq!(second.bundles["site"].js[0], first.bundles["site"].js[0]);
  let rebuilt = fs::read_to_string(output_file(&config, &second.bundles["site"].js[1])).unwrap();
  assert!(rebuilt.contains("var site = 5;"));

  assert_eq!(second.bundles["admin"], first.bundles["admin"]);
  let admin_after: Vec<String> = second.bundles["admin"]
    .js
    .iter()
    .chain(&second.bundles["admin"].css)
    .map(|name| fs::read_to_string(output_file(&config, name)).unwrap())
    .collect();
  assert_eq!(admin_after, admin_files);
}

#[test]
fn dependents_outside_the_scanned_directory_are_processed_on_request() {
  let temp = project();
  let root = temp.path();
  write(root, "web/js/jquery.js", "var jquery;");
  write(root, "assets/vendor/jquery.json", r#"{"basePath": "../../web", "js": ["js/jquery.js"]}"#);
  write(root, "web/js/page.js", "var page;");
  write(
    root,
    "assets/page.json",
    r#"{"basePath": "../web", "js": ["js/page.js"], "depends": ["vendor/jquery"]}"#,
  );
  let mut config = config(root, false);
  config.recursive = false;
  let artifact = root.join("bundles.json");

  let report = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();
  assert_eq!(report.status("vendor/jquery"), None);
  assert_eq!(report.status("page"), Some(&BundleStatus::Created));

  config.process_dependent = true;
  let report = PrecompileBuilder::from_config(&config)
    .unwrap()
    .build(&artifact)
    .unwrap();
  assert_eq!(report.status("vendor/jquery"), Some(&BundleStatus::Created));
  let manifest = BundleManifest::load(&artifact).unwrap();
  let jquery = fs::read_to_string(output_file(&config, &manifest.bundles["vendor/jquery"].js[0])).unwrap();
  assert!(jquery.contains("var jquery;"));
}
