//! Build driver: seeded defaults, configuration/target selection, and the
//! walk that turns the configuration tree into a [`RuleSet`].

use std::time::Instant;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::Engine;
use crate::util::process::{processor_count, JobRunner};

use super::graph::{Rule, RuleSet, TargetId};
use super::plan::BuildPlan;
use super::scheduler;

/// Drives whole builds: one pass per selected configuration.
pub struct Builder {
    engine: Engine,
    jobs: Option<usize>,
    show_progress: bool,
    input_targets: Vec<String>,
}

impl Builder {
    pub fn new(engine: Engine) -> Self {
        Builder {
            engine,
            jobs: None,
            show_progress: false,
            input_targets: Vec::new(),
        }
    }

    /// Override the parallel job bound. Defaults to the processor count.
    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Build every selected configuration, aborting on the first failure.
    pub fn build(
        &mut self,
        user_args: &[(String, String)],
        runner: &mut dyn JobRunner,
    ) -> Result<()> {
        let configurations = self.prepare(user_args)?;
        for configuration in &configurations {
            let started = Instant::now();
            let mut set = self.rule_set_for(configuration)?;
            set.resolve_dependencies();

            let jobs = self.jobs.unwrap_or_else(processor_count);
            let progress = if self.show_progress && set.active_rules > 1 {
                Some(rule_progress(set.active_rules))
            } else {
                None
            };
            let outcome = scheduler::execute(&mut set, jobs, runner, progress.as_ref());
            if let Some(progress) = progress {
                progress.finish_and_clear();
            }
            outcome?;

            eprintln!(
                "    Finished {} `{}` rule(s) in {:.2}s",
                set.finished_rules,
                configuration,
                started.elapsed().as_secs_f64()
            );
        }
        self.engine.leave_key();
        Ok(())
    }

    /// Resolve the rule graph of the first selected configuration without
    /// executing anything.
    pub fn plan(&mut self, user_args: &[(String, String)]) -> Result<BuildPlan> {
        let configurations = self.prepare(user_args)?;
        let configuration = &configurations[0];
        let mut set = self.rule_set_for(configuration)?;
        set.resolve_dependencies();
        self.engine.leave_key();
        Ok(BuildPlan::from_rule_set(configuration, &set))
    }

    /// Seed defaults, overlay the user arguments, and pick the
    /// configurations to build. Leaves the engine inside `configurations`.
    fn prepare(&mut self, user_args: &[(String, String)]) -> Result<Vec<String>> {
        seed_default_keys(&mut self.engine);

        self.engine.enter_unnamed_key();
        for (key, value) in user_args {
            self.engine.add_default_key(key, Some(value));
        }

        let input_configs = self.engine.get_keys_of("configuration", true);
        self.input_targets = self.engine.get_keys_of("target", true);

        if !self.engine.enter_key("configurations", true) {
            bail!("cannot find any configurations");
        }
        if input_configs.is_empty() {
            match self.engine.get_first_key() {
                Some(first) => Ok(vec![first]),
                None => bail!("cannot find any configurations"),
            }
        } else {
            for name in &input_configs {
                if !self.engine.enter_key(name, false) {
                    bail!("cannot find configuration \"{}\"", name);
                }
                self.engine.leave_key();
            }
            Ok(input_configs)
        }
    }

    fn rule_set_for(&mut self, configuration: &str) -> Result<RuleSet> {
        if !self.engine.enter_key(configuration, false) {
            bail!("cannot find configuration \"{}\"", configuration);
        }
        self.engine.add_default_key("configuration", Some(configuration));
        let set = self.collect_rules();
        self.engine.leave_key();
        set
    }

    /// Walk `targets` and read one rule per file plus one aggregate rule
    /// per target. Inactive targets are collected too: their outputs take
    /// part in dependency matching.
    fn collect_rules(&mut self) -> Result<RuleSet> {
        if !self.engine.enter_key("targets", true) {
            bail!("cannot find any targets");
        }
        let all_targets = self.engine.get_keys();
        if all_targets.is_empty() {
            self.engine.leave_key();
            bail!("cannot find any targets");
        }
        for name in &self.input_targets {
            if !all_targets.contains(name) {
                self.engine.leave_key();
                bail!("cannot find target \"{}\"", name);
            }
        }

        let mut set = RuleSet::default();
        for name in &all_targets {
            let active = self.input_targets.is_empty() || self.input_targets.contains(name);
            let target = set.add_target(name.clone(), active);

            if !self.engine.enter_key(name, false) {
                continue;
            }
            self.engine.add_default_key("target", Some(name));

            if self.engine.enter_key("files", false) {
                for file in self.engine.get_keys() {
                    if !self.engine.enter_key(&file, false) {
                        continue;
                    }
                    self.engine.add_default_key("file", Some(&file));
                    let rule = self.read_rule(target);
                    set.add_rule(rule);
                    self.engine.leave_key();
                }
                self.engine.leave_key();
            }

            let rule = self.read_rule(target);
            set.add_rule(rule);
            self.engine.leave_key();
        }
        self.engine.leave_key();
        Ok(set)
    }

    /// Read the rule fields declared directly in the current scope.
    fn read_rule(&mut self, target: TargetId) -> Rule {
        Rule {
            target,
            inputs: self.engine.get_keys_of("input", false),
            outputs: self.engine.get_keys_of("output", false),
            command: self.engine.get_keys_of("command", false),
            message: self.engine.get_keys_of("message", false),
            ..Rule::default()
        }
    }
}

// Rule messages go to stdout whether or not a bar is drawn, so the bar
// draws there too.
fn rule_progress(total: usize) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stdout());
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Install the built-in defaults. Runs before the overlay is created, so
/// everything lands in the root scope and anything the build file declares
/// wins over it.
fn seed_default_keys(engine: &mut Engine) {
    engine.add_default_key("CC", Some("gcc"));
    engine.add_default_key("CXX", Some("g++"));

    engine.enter_default_key("configurations");
    engine.add_resolvable_key("Debug", None);
    engine.add_resolvable_key("Release", None);
    engine.leave_key();

    engine.add_default_key("targets", None);
    engine.add_default_key("buildDir", Some("$(configuration)"));

    engine.enter_default_key("cppCompile");
    engine.add_resolvable_key(
        "ofile",
        Some("$(buildDir)/$(patsubst %.cpp,%.o,$(subst ../,,$(file)))"),
    );
    engine.add_resolvable_key("input", Some("$(file)"));
    engine.add_resolvable_key("output", Some("$(ofile)"));
    engine.add_resolvable_key(
        "command",
        Some("$(CXX) -o $(ofile) -c $(file) $(CXXFLAGS) $(patsubst %,-D%,$(defines)) $(patsubst %,-I%,$(includePaths))"),
    );
    engine.add_resolvable_key("message", Some("$(file)"));
    engine.leave_key();

    engine.enter_default_key("cppLink");
    engine.add_resolvable_key(
        "input",
        Some("$(foreach file,$(files),$(buildDir)/$(patsubst %.cpp,%.o,$(subst ../,,$(file))))"),
    );
    engine.add_resolvable_key("output", Some("$(buildDir)/$(target)"));
    engine.add_resolvable_key(
        "command",
        Some("$(CXX) -o $(output) $(input) $(LDFLAGS) $(patsubst %,-L%,$(libPaths)) $(patsubst %,-l%,$(libs))"),
    );
    engine.add_resolvable_key("message", Some("Linking $(target)..."));
    engine.leave_key();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    fn builder_for(source: &str) -> Builder {
        let mut engine = Engine::new();
        engine.load_source(source).unwrap();
        Builder::new(engine)
    }

    fn args(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_explicit_rules_run_in_dependency_order() {
        let tmp = TempDir::new().unwrap();
        let source = format!(
            r#"
out = "{dir}/out"
targets = {{
    c = {{ output = "$(out)/c.bin", command = "gen c", message = "C" }}
    b = {{ input = "$(out)/c.bin", output = "$(out)/b.bin", command = "gen b" }}
    a = {{ input = "$(out)/b.bin", output = "$(out)/a.bin", command = "gen a" }}
}}
"#,
            dir = tmp.path().display()
        );
        let mut builder = builder_for(&source).jobs(Some(1));
        let mut runner = FakeRunner::new();
        builder.build(&args(&[("target", "a")]), &mut runner).unwrap();

        let order: Vec<String> = runner.spawned.iter().map(|argv| argv.join(" ")).collect();
        assert_eq!(order, vec!["gen c", "gen b", "gen a"]);
    }

    #[test]
    fn test_unrequested_independent_target_is_skipped() {
        let source = r#"
targets = {
    a = { output = "a.bin", command = "gen a" }
    b = { output = "b.bin", command = "gen b" }
}
"#;
        let mut builder = builder_for(source);
        let mut runner = FakeRunner::new();
        builder.build(&args(&[("target", "a")]), &mut runner).unwrap();
        assert_eq!(runner.spawned.len(), 1);
        assert_eq!(runner.spawned[0].join(" "), "gen a");
    }

    #[test]
    fn test_all_targets_build_without_selector() {
        let source = r#"
targets = {
    a = { output = "a.bin", command = "gen a" }
    b = { output = "b.bin", command = "gen b" }
}
"#;
        let mut builder = builder_for(source);
        let mut runner = FakeRunner::new();
        builder.build(&[], &mut runner).unwrap();
        assert_eq!(runner.spawned.len(), 2);
    }

    #[test]
    fn test_cpp_templates_compile_and_link() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.cpp"), "").unwrap();
        fs::write(src.join("b.cpp"), "").unwrap();

        let source = format!(
            r#"
targets = {{
    app = cppLink + {{
        files = {{ "{dir}/src/*.cpp" = cppCompile }}
        libs = "m"
    }}
}}
"#,
            dir = tmp.path().display()
        );
        let mut builder = builder_for(&source).jobs(Some(1));
        let mut runner = FakeRunner::new();
        let build_dir = format!("{}/build", tmp.path().display());
        builder
            .build(&args(&[("buildDir", &build_dir)]), &mut runner)
            .unwrap();

        assert_eq!(runner.spawned.len(), 3);
        let compile_a = runner.spawned[0].join(" ");
        assert!(compile_a.starts_with("g++ -o"), "got: {}", compile_a);
        assert!(compile_a.contains("a.o"));
        assert!(compile_a.contains("-c"));
        assert!(compile_a.ends_with("a.cpp"));

        let link = runner.spawned[2].join(" ");
        assert!(link.contains("a.o") && link.contains("b.o"), "got: {}", link);
        assert!(link.ends_with("-lm"));
        assert!(link.contains(&format!("{}/app", build_dir)));
    }

    #[test]
    fn test_configuration_reaches_build_dir() {
        let tmp = TempDir::new().unwrap();
        let source = format!(
            "targets = {{ a = {{ output = \"{dir}/$(buildDir)/a.bin\", command = \"gen $(buildDir)/a.bin\" }} }}",
            dir = tmp.path().display()
        );
        let mut builder = builder_for(&source);
        let mut runner = FakeRunner::new();
        builder.build(&[], &mut runner).unwrap();
        // first configuration is the seeded Debug
        assert_eq!(runner.spawned[0].join(" "), "gen Debug/a.bin");
        assert!(tmp.path().join("Debug").is_dir());
    }

    #[test]
    fn test_multiple_configurations_build_in_order() {
        let tmp = TempDir::new().unwrap();
        let source = format!(
            "targets = {{ a = {{ output = \"{dir}/$(configuration)/a\", command = \"gen $(configuration)\" }} }}",
            dir = tmp.path().display()
        );
        let mut builder = builder_for(&source);
        let mut runner = FakeRunner::new();
        builder
            .build(&args(&[("configuration", "Debug Release")]), &mut runner)
            .unwrap();
        let commands: Vec<String> = runner.spawned.iter().map(|argv| argv.join(" ")).collect();
        assert_eq!(commands, vec!["gen Debug", "gen Release"]);
    }

    #[test]
    fn test_file_declared_configuration() {
        let source = r#"
configurations = { Coverage = { CXXFLAGS = "--coverage" } }
targets = { a = { output = "out", command = "gen $(CXXFLAGS)" } }
"#;
        let mut builder = builder_for(source);
        let mut runner = FakeRunner::new();
        builder
            .build(&args(&[("configuration", "Coverage")]), &mut runner)
            .unwrap();
        assert_eq!(runner.spawned[0].join(" "), "gen --coverage");
    }

    #[test]
    fn test_unknown_configuration_is_an_error() {
        let mut builder = builder_for("targets = { a = { command = \"gen\" } }");
        let mut runner = FakeRunner::new();
        let err = builder
            .build(&args(&[("configuration", "Profile")]), &mut runner)
            .unwrap_err();
        assert!(err.to_string().contains("cannot find configuration \"Profile\""));
        assert!(runner.spawned.is_empty());
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let mut builder = builder_for("targets = { a = { command = \"gen\" } }");
        let mut runner = FakeRunner::new();
        let err = builder
            .build(&args(&[("target", "nope")]), &mut runner)
            .unwrap_err();
        assert!(err.to_string().contains("cannot find target \"nope\""));
        assert!(runner.spawned.is_empty());
    }

    #[test]
    fn test_no_targets_is_an_error() {
        let mut builder = builder_for("");
        let mut runner = FakeRunner::new();
        let err = builder.build(&[], &mut runner).unwrap_err();
        assert!(err.to_string().contains("cannot find any targets"));
    }

    #[test]
    fn test_plan_resolves_without_running() {
        let source = r#"
targets = {
    gen = { output = "g.h", command = "make_header" }
    app = { input = "g.h", output = "app", command = "cc -o app" }
}
"#;
        let mut builder = builder_for(source);
        let plan = builder.plan(&[]).unwrap();
        assert_eq!(plan.configuration, "Debug");
        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.rules[0].target, "gen");
        assert_eq!(plan.rules[1].dependencies, vec![0]);
    }

    #[test]
    fn test_overrides_shadow_file_keys() {
        let source = r#"
CXX = "clang++"
targets = { a = { output = "o", command = "$(CXX) build" } }
"#;
        // a file declaration beats the seeded default...
        let mut builder = builder_for(source);
        let mut runner = FakeRunner::new();
        builder.build(&[], &mut runner).unwrap();
        assert_eq!(runner.spawned[0][0], "clang++");

        // ...and a user override beats the file declaration
        let mut builder = builder_for(source);
        let mut runner = FakeRunner::new();
        builder
            .build(&args(&[("CXX", "zig-c++")]), &mut runner)
            .unwrap();
        assert_eq!(runner.spawned[0][0], "zig-c++");
    }
}
