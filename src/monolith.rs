//! Page-time combination with monolith handling.
//!
//! Monolith bundles are handled first. A monolith that an earlier build already combined
//! (processed and without dependencies) is registered as is, and every bundle it absorbed
//! is dropped from the page. Any other monolith is combined together with the part of its
//! dependency closure still on the page, using its own tag options. Everything left is then
//! combined into one script and one stylesheet with default options.

use indexmap::IndexMap;
use tracing::debug;

use crate::collector::{FileCollector, WorkingSet};
use crate::combiner::{Combiner, Emission};
use crate::config::CombinerConfig;
use crate::error::Result;
use crate::models::{Bundle, CssOptions, FileSet, JsOptions, MediaType};
use crate::registry::{AssetResolver, BasePathResolver, Fingerprint};
use crate::urls::is_absolute_url;

/// A tag the page should render, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
  /// `<script src=url>`.
  Script {
    /// Public URL of the script.
    url: String,
    /// Tag options.
    options: JsOptions,
  },
  /// `<link rel=stylesheet href=url>`.
  Stylesheet {
    /// Public URL of the stylesheet.
    url: String,
    /// Tag options.
    options: CssOptions,
  },
}

impl Registration {
  /// URL of the registered file.
  pub fn url(&self) -> &str {
    match self {
      Self::Script { url, .. } | Self::Stylesheet { url, .. } => url,
    }
  }
}

/// Combines the bundles registered by a page into a minimal set of tags.
pub struct PageCombiner {
  combiner: Combiner,
  resolver: Box<dyn AssetResolver>,
  fingerprint: Box<dyn Fingerprint>,
  output_url: String,
}

impl PageCombiner {
  /// Page combiner publishing outputs of `combiner` under `output_url`.
  pub fn new(
    combiner: Combiner,
    resolver: Box<dyn AssetResolver>,
    fingerprint: Box<dyn Fingerprint>,
    output_url: impl Into<String>,
  ) -> Self {
    Self {
      combiner,
      resolver,
      fingerprint,
      output_url: output_url.into(),
    }
  }

  /// Page combiner for `config`, creating its output directory.
  pub fn from_config(config: &CombinerConfig) -> Result<Self> {
    let output_dir = config.prepare_output_dir()?;
    Ok(Self::new(
      Combiner::from_config(config, output_dir),
      Box::new(BasePathResolver::new(&config.assets_dir)),
      config.fingerprint.build(),
      config.output_url.clone(),
    ))
  }

  /// Combine the page's bundles, given dependencies first, into ordered registrations.
  pub fn combine_bundles(&self, bundles: IndexMap<String, Bundle>) -> Result<Vec<Registration>> {
    let mut working: WorkingSet = bundles;
    let mut registrations = Vec::new();

    let names: Vec<String> = working.keys().cloned().collect();
    for name in names {
      let Some(bundle) = working.get(&name) else {
        continue;
      };
      if !bundle.publish_options.monolith {
        continue;
      }

      if bundle.is_precombined() {
        if let Some(bundle) = working.shift_remove(&name) {
          self.register_monolith(&bundle, &mut working, &mut registrations);
        }
      } else {
        let js_options = bundle.js_options.clone();
        let css_options = bundle.css_options.clone();
        self.assemble_monolith(
          &[name],
          &mut working,
          js_options,
          css_options,
          &mut registrations,
        )?;
      }
    }

    let rest: Vec<String> = working.keys().cloned().collect();
    self.assemble_monolith(
      &rest,
      &mut working,
      JsOptions::default(),
      CssOptions::default(),
      &mut registrations,
    )?;
    Ok(registrations)
  }

  /// Register an already combined monolith and drop the bundles it absorbed from `working`.
  pub fn register_monolith(
    &self,
    bundle: &Bundle,
    working: &mut WorkingSet,
    registrations: &mut Vec<Registration>,
  ) {
    debug!(bundle = %bundle.name, "registering precombined monolith");
    working.shift_remove(&bundle.name);
    for included in &bundle.publish_options.acc_included {
      working.shift_remove(included);
    }

    let base_url = bundle.base_url.as_deref().unwrap_or(&self.output_url);
    for file in &bundle.js {
      registrations.push(Registration::Script {
        url: join_url(base_url, file),
        options: bundle.js_options.clone(),
      });
    }
    for file in &bundle.css {
      registrations.push(Registration::Stylesheet {
        url: join_url(base_url, file),
        options: bundle.css_options.clone(),
      });
    }
  }

  /// Collect `names` and whatever of their closures is still in `working`, then combine them.
  pub fn assemble_monolith(
    &self,
    names: &[String],
    working: &mut WorkingSet,
    js_options: JsOptions,
    css_options: CssOptions,
    registrations: &mut Vec<Registration>,
  ) -> Result<()> {
    let collector = FileCollector::new(self.resolver.as_ref(), self.fingerprint.as_ref());
    let mut files = FileSet::default();
    for name in names {
      collector.collect(name, working, &mut files)?;
    }

    let scripts = self.combiner.emit(&files, MediaType::Js)?;
    for url in self.urls(&scripts) {
      registrations.push(Registration::Script {
        url,
        options: js_options.clone(),
      });
    }

    let styles = self.combiner.emit(&files, MediaType::Css)?;
    for url in self.urls(&styles) {
      registrations.push(Registration::Stylesheet {
        url,
        options: css_options.clone(),
      });
    }
    Ok(())
  }

  fn urls(&self, emission: &Emission) -> Vec<String> {
    emission
      .external
      .iter()
      .cloned()
      .chain(
        emission
          .combined
          .iter()
          .map(|outcome| join_url(&self.output_url, &outcome.file_name)),
      )
      .collect()
  }
}

fn join_url(base: &str, file: &str) -> String {
  if is_absolute_url(file) {
    return file.to_string();
  }
  format!("{}/{}", base.trim_end_matches('/'), file.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::path::Path;

  use pretty_assertions::assert_eq;
  use tempfile::{TempDir, tempdir};

  use crate::filter::{ConcatFilter, CssFilter};

  fn marker(path: &Path) -> anyhow::Result<String> {
    Ok(fs::read_to_string(path)?.len().to_string())
  }

  fn page_combiner(temp: &TempDir) -> PageCombiner {
    let root = temp.path();
    let output = root.join("out");
    fs::create_dir_all(&output).unwrap();
    PageCombiner::new(
      Combiner::new(
        &output,
        "test",
        Box::new(ConcatFilter::new(root)),
        Box::new(CssFilter::new(root)),
      ),
      Box::new(BasePathResolver::new(root.join("src"))),
      Box::new(marker),
      "/ac",
    )
  }

  fn write_sources(root: &Path, files: &[&str]) {
    fs::create_dir_all(root.join("src")).unwrap();
    for file in files {
      fs::write(root.join("src").join(file), format!("/* {file} */")).unwrap();
    }
  }

  fn page(bundles: Vec<Bundle>) -> IndexMap<String, Bundle> {
    bundles
      .into_iter()
      .map(|bundle| (bundle.name.clone(), bundle))
      .collect()
  }

  fn urls(registrations: &[Registration]) -> Vec<&str> {
    registrations.iter().map(Registration::url).collect()
  }

  #[test]
  fn combines_plain_bundles_into_one_file_per_media() {
    let temp = tempdir().unwrap();
    write_sources(temp.path(), &["core.js", "app.js", "app.css"]);
    let combiner = page_combiner(&temp);

    let registrations = combiner
      .combine_bundles(page(vec![
        Bundle::new("core").with_js("core.js"),
        Bundle::new("app")
          .with_js("app.js")
          .with_js("https://cdn.test/lib.js")
          .with_css("app.css")
          .depends_on("core"),
      ]))
      .unwrap();

    assert_eq!(registrations.len(), 3);
    assert_eq!(registrations[0].url(), "https://cdn.test/lib.js");
    assert!(registrations[1].url().starts_with("/ac/") && registrations[1].url().ends_with(".js"));
    assert!(matches!(registrations[2], Registration::Stylesheet { .. }));

    let script = temp
      .path()
      .join("out")
      .join(registrations[1].url().trim_start_matches("/ac/"));
    let content = fs::read_to_string(script).unwrap();
    assert!(content.find("core.js").unwrap() < content.find("app.js").unwrap());
  }

  #[test]
  fn monolith_keeps_its_options_and_absorbs_dependencies() {
    let temp = tempdir().unwrap();
    write_sources(temp.path(), &["core.js", "admin.js", "site.js"]);
    let combiner = page_combiner(&temp);

    let mut admin = Bundle::new("admin")
      .with_js("admin.js")
      .depends_on("core")
      .monolith();
    admin.js_options.position = Some(3);

    let registrations = combiner
      .combine_bundles(page(vec![
        Bundle::new("core").with_js("core.js"),
        admin,
        Bundle::new("site").with_js("site.js").depends_on("core"),
      ]))
      .unwrap();

    assert_eq!(registrations.len(), 2);
    match &registrations[0] {
      Registration::Script { url, options } => {
        assert_eq!(options.position, Some(3));
        let content = fs::read_to_string(temp.path().join("out").join(url.trim_start_matches("/ac/")))
          .unwrap();
        assert!(content.contains("core.js") && content.contains("admin.js"));
      }
      other => panic!("unexpected registration: {other:?}"),
    }
    match &registrations[1] {
      Registration::Script { url, options } => {
        assert_eq!(options, &JsOptions::default());
        let content = fs::read_to_string(temp.path().join("out").join(url.trim_start_matches("/ac/")))
          .unwrap();
        assert!(content.contains("site.js"));
        assert!(!content.contains("core.js"));
      }
      other => panic!("unexpected registration: {other:?}"),
    }
  }

  #[test]
  fn precombined_monolith_is_registered_without_recombining() {
    let temp = tempdir().unwrap();
    write_sources(temp.path(), &["core.js", "extra.js"]);
    let combiner = page_combiner(&temp);

    let mut precombined = Bundle::new("admin").monolith();
    precombined.base_url = Some("/ac".into());
    precombined.js = vec!["https://cdn.test/lib.js".into(), "abc-def.js".into()];
    precombined.css = vec!["123-456.css".into()];
    precombined.publish_options.acc_processed = true;
    precombined.publish_options.acc_included = ["core".to_string()].into();

    let registrations = combiner
      .combine_bundles(page(vec![
        Bundle::new("core").with_js("core.js"),
        precombined,
        Bundle::new("extra").with_js("extra.js"),
      ]))
      .unwrap();

    let urls = urls(&registrations);
    assert_eq!(&urls[..3], ["https://cdn.test/lib.js", "/ac/abc-def.js", "/ac/123-456.css"]);
    assert_eq!(registrations.len(), 4);

    let rest = temp.path().join("out").join(urls[3].trim_start_matches("/ac/"));
    let content = fs::read_to_string(rest).unwrap();
    assert!(content.contains("extra.js"));
    assert!(!content.contains("core.js"));
  }

  #[test]
  fn errors_abort_the_page() {
    let temp = tempdir().unwrap();
    write_sources(temp.path(), &[]);
    let combiner = page_combiner(&temp);

    let result = combiner.combine_bundles(page(vec![Bundle::new("broken").with_js("missing.js")]));
    assert!(result.is_err());
  }

  #[test]
  fn joins_urls() {
    assert_eq!(join_url("/ac/", "x.js"), "/ac/x.js");
    assert_eq!(join_url("/", "x.js"), "/x.js");
    assert_eq!(join_url("/ac", "//cdn.test/x.js"), "//cdn.test/x.js");
  }
}
