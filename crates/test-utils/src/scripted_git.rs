use std::path::Path;
use std::sync::{Arc, Mutex};

use sitepipe::publish::git::{GitCommand, GitFuture, GitOutput};

#[derive(Debug, Default)]
struct Inner {
    rules: Mutex<Vec<(Vec<String>, GitOutput)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

/// A fake git that never spawns a process.
///
/// Each call is answered by the most recently added rule whose argument
/// prefix matches; unmatched calls succeed with empty output. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGit {
    inner: Arc<Inner>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls starting with `prefix` with `output`.
    pub fn on(&self, prefix: &[&str], output: GitOutput) -> &Self {
        let prefix = prefix.iter().map(|s| s.to_string()).collect();
        self.inner.rules.lock().unwrap().push((prefix, output));
        self
    }

    /// Every call so far, as space-joined argument strings.
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|args| args.join(" "))
            .collect()
    }

    /// Whether any call started with `prefix` (space-joined).
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

impl GitCommand for ScriptedGit {
    fn run<'a>(&'a self, _dir: &'a Path, args: &'a [String]) -> GitFuture<'a> {
        Box::pin(async move {
            self.inner.calls.lock().unwrap().push(args.to_vec());
            let rules = self.inner.rules.lock().unwrap();
            let answer = rules
                .iter()
                .rev()
                .find(|(prefix, _)| args.starts_with(prefix))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| GitOutput::ok(""));
            Ok(answer)
        })
    }
}
