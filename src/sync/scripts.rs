// ABOUTME: Shell scripts run on hosts by the synchronizer.
// ABOUTME: Every interpolated path and value is quoted.

use crate::environment::Layout;
use crate::shell::quote;
use crate::types::RevisionRef;

use super::NOT_FOUND_EXIT;

/// Create the state directory and mirror, or refresh the mirror.
pub fn prepare(layout: &Layout, repository: &str) -> String {
    let state = quote(&layout.state_dir()).into_owned();
    let cache = quote(&layout.cache()).into_owned();
    let repo = quote(repository);
    format!(
        "set -e\n\
         mkdir -p {state}\n\
         if [ -d {cache} ]; then\n\
         \x20 git -C {cache} remote set-url origin {repo}\n\
         \x20 git -C {cache} fetch --prune --quiet origin\n\
         else\n\
         \x20 git clone --mirror --quiet {repo} {cache}\n\
         fi\n"
    )
}

/// Print the commit for the first candidate ref that exists in the mirror.
pub fn resolve(layout: &Layout, revision: &RevisionRef) -> String {
    let cache = quote(&layout.cache()).into_owned();
    let candidates: Vec<String> = revision
        .candidates()
        .iter()
        .map(|c| quote(&format!("{}^{{commit}}", c)).into_owned())
        .collect();
    format!(
        "for ref in {candidates}; do\n\
         \x20 if commit=$(git -C {cache} rev-parse --verify --quiet \"$ref\"); then\n\
         \x20   echo \"$commit\"\n\
         \x20   exit 0\n\
         \x20 fi\n\
         done\n\
         exit {NOT_FOUND_EXIT}\n",
        candidates = candidates.join(" "),
    )
}

/// Report working copy existence, HEAD, tracked modifications, and the
/// recorded and pending commits.
pub fn inspect(layout: &Layout) -> String {
    let source = quote(&layout.source()).into_owned();
    let marker = quote(&layout.revision_marker()).into_owned();
    let pending = quote(&layout.pending_marker()).into_owned();
    format!(
        "if [ -d {source}/.git ]; then\n\
         \x20 echo exists=1\n\
         \x20 echo head=$(git -C {source} rev-parse --verify --quiet HEAD)\n\
         \x20 echo modified=$(git -C {source} status --porcelain --untracked-files=no | wc -l | tr -d ' ')\n\
         else\n\
         \x20 echo exists=0\n\
         fi\n\
         if [ -f {marker} ]; then echo recorded=$(cat {marker}); fi\n\
         if [ -f {pending} ]; then echo pending=$(cat {pending}); fi\n"
    )
}

/// Write the commit about to be checked out, so an interrupted sync can be
/// told apart from a hand-made change.
fn mark_pending(layout: &Layout, commit: &str) -> String {
    let pending = quote(&layout.pending_marker()).into_owned();
    let tmp = quote(&format!("{}.tmp", layout.pending_marker())).into_owned();
    format!(
        "printf '%s\\n' {commit} > {tmp}\n\
         mv -f {tmp} {pending}\n",
        commit = quote(commit),
    )
}

/// Clone a working copy that borrows the mirror's objects.
pub fn create(layout: &Layout, commit: &str) -> String {
    let cache = quote(&layout.cache()).into_owned();
    let source = quote(&layout.source()).into_owned();
    format!(
        "set -e\n\
         {pending}\
         git clone --shared --no-checkout --quiet {cache} {source}\n\
         git -C {source} reset --hard --quiet {commit}\n",
        pending = mark_pending(layout, commit),
        commit = quote(commit),
    )
}

/// Move an existing working copy to `commit` in place.
pub fn update(layout: &Layout, commit: &str) -> String {
    let source = quote(&layout.source()).into_owned();
    format!(
        "set -e\n\
         {pending}\
         git -C {source} fetch --quiet origin\n\
         git -C {source} reset --hard --quiet {commit}\n",
        pending = mark_pending(layout, commit),
        commit = quote(commit),
    )
}

/// Record the commit atomically, clear the pending marker, and point
/// `current` at the working copy.
pub fn record(layout: &Layout, commit: &str) -> String {
    let marker = quote(&layout.revision_marker()).into_owned();
    let tmp = quote(&format!("{}.tmp", layout.revision_marker())).into_owned();
    format!(
        "set -e\n\
         printf '%s\\n' {commit} > {tmp}\n\
         mv -f {tmp} {marker}\n\
         rm -f {pending}\n\
         ln -sfn source {current}\n",
        commit = quote(commit),
        pending = quote(&layout.pending_marker()),
        current = quote(&layout.current()),
    )
}

pub fn read_marker(layout: &Layout) -> String {
    let marker = quote(&layout.revision_marker()).into_owned();
    format!("if [ -f {marker} ]; then cat {marker}; fi\n")
}
