#![allow(dead_code)]

use std::collections::BTreeMap;

use sitepipe::config::{
    ConfigFile, ConfigSection, DefaultSection, PublishSection, RawConfigFile, StageConfig,
    TaskConfig,
};
use sitepipe::types::CommitPolicy;

/// Builder for `RawConfigFile` / `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                task: Vec::new(),
                publish: None,
            },
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn with_global_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.config.config.concurrency = n;
        self
    }

    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.config.config.output_dir = dir.to_string();
        self
    }

    pub fn with_task_timeout(mut self, timeout: &str) -> Self {
        self.config.config.task_timeout = Some(timeout.to_string());
        self
    }

    pub fn with_publish(mut self, remote: &str, branch: &str) -> Self {
        self.config.publish = Some(PublishSection {
            remote: remote.to_string(),
            branch: branch.to_string(),
            dir: String::new(),
            commit: true,
            push: true,
            connect_commits: false,
            policy: CommitPolicy::OnlyOnChange,
            message: None,
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`. Defaults to a `copy` stage writing to the
/// output root.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: TaskConfig {
                id: id.to_string(),
                after: vec![],
                inputs: vec![],
                exclude: vec![],
                append_default_exclude: true,
                output: String::new(),
                stage: StageConfig::Copy { base: None },
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.task.inputs.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task.exclude.push(pattern.to_string());
        self
    }

    pub fn no_default_exclude(mut self) -> Self {
        self.task.append_default_exclude = false;
        self
    }

    pub fn output(mut self, dir: &str) -> Self {
        self.task.output = dir.to_string();
        self
    }

    pub fn copy_from(mut self, base: &str) -> Self {
        self.task.stage = StageConfig::Copy {
            base: Some(base.to_string()),
        };
        self
    }

    pub fn concat(mut self, file: &str) -> Self {
        self.task.stage = StageConfig::Concat {
            file: file.to_string(),
            separator: None,
        };
        self
    }

    pub fn command(mut self, cmd: &str) -> Self {
        self.task.stage = StageConfig::Command {
            cmd: cmd.to_string(),
            env: BTreeMap::new(),
        };
        self
    }

    pub fn precache(mut self, file: &str, cache_id: &str) -> Self {
        self.task.stage = StageConfig::Precache {
            file: file.to_string(),
            cache_id: cache_id.to_string(),
            strip_prefix: String::new(),
            handle_fetch: true,
        };
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
