//! Seams to the surrounding build system. Kiln consumes these as
//! interfaces only; the project model and task runner live outside this
//! crate.

use std::collections::HashMap;
use std::path::PathBuf;

/// Query surface over the loaded project model.
pub trait ProjectModel: Send + Sync {
    fn module_names(&self) -> Vec<String>;
    /// Compiled-output directory for a module, if it produces one.
    fn module_output_dir(&self, module: &str) -> Option<PathBuf>;
    fn module_runtime_classpath(&self, module: &str) -> Vec<PathBuf>;
}

/// Runs a named task in the surrounding build (dependency setup and the
/// like).
pub trait TaskRunner: Send + Sync {
    fn run_task(&self, name: &str) -> Result<(), String>;
}

/// In-memory project model, for tests and embedders that assemble the
/// module table themselves.
#[derive(Default)]
pub struct StaticProjectModel {
    modules: HashMap<String, (Option<PathBuf>, Vec<PathBuf>)>,
}

impl StaticProjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(
        &mut self,
        name: &str,
        output_dir: Option<PathBuf>,
        runtime_classpath: Vec<PathBuf>,
    ) {
        self.modules
            .insert(name.to_string(), (output_dir, runtime_classpath));
    }
}

impl ProjectModel for StaticProjectModel {
    fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    fn module_output_dir(&self, module: &str) -> Option<PathBuf> {
        self.modules.get(module).and_then(|(out, _)| out.clone())
    }

    fn module_runtime_classpath(&self, module: &str) -> Vec<PathBuf> {
        self.modules
            .get(module)
            .map(|(_, cp)| cp.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_model_answers_queries() {
        let mut model = StaticProjectModel::new();
        model.add_module(
            "core.util",
            Some(PathBuf::from("/out/core.util")),
            vec![PathBuf::from("/libs/annotations.jar")],
        );
        model.add_module("zeta", None, vec![]);

        assert_eq!(model.module_names(), ["core.util", "zeta"]);
        assert_eq!(
            model.module_output_dir("core.util"),
            Some(PathBuf::from("/out/core.util"))
        );
        assert_eq!(model.module_output_dir("zeta"), None);
        assert_eq!(model.module_runtime_classpath("missing"), Vec::<PathBuf>::new());
    }
}
