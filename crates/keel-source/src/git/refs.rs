//! Remote reference listing and matching.

/// One line of `git ls-remote` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub commit: String,
}

/// Outcome of matching a symbolic revision against the advertised refs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefMatch {
    Found(String),
    Ambiguous(Vec<String>),
    NotFound,
}

/// Parse `git ls-remote` output (`<sha>\t<ref>` per line).
pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    output
        .lines()
        .filter_map(|line| {
            let (commit, name) = line.split_once('\t')?;
            let commit = commit.trim();
            let name = name.trim();
            if commit.is_empty() || name.is_empty() {
                return None;
            }
            Some(RemoteRef {
                name: name.to_string(),
                commit: commit.to_lowercase(),
            })
        })
        .collect()
}

/// Match `revision` exactly against branch, tag, and HEAD names.
///
/// Annotated tags resolve to the commit they point at (the peeled `^{}`
/// entry). Several names resolving to different commits is ambiguous.
pub fn match_revision(refs: &[RemoteRef], revision: &str) -> RefMatch {
    let candidates: Vec<String> = if revision == "HEAD" || revision.starts_with("refs/") {
        vec![revision.to_string()]
    } else {
        vec![
            format!("refs/heads/{}", revision),
            format!("refs/tags/{}", revision),
        ]
    };

    let mut commits: Vec<String> = Vec::new();
    for candidate in &candidates {
        let Some(commit) = lookup(refs, candidate) else {
            continue;
        };
        if !commits.contains(&commit) {
            commits.push(commit);
        }
    }

    match commits.len() {
        0 => RefMatch::NotFound,
        1 => RefMatch::Found(commits.remove(0)),
        _ => RefMatch::Ambiguous(commits),
    }
}

fn lookup(refs: &[RemoteRef], name: &str) -> Option<String> {
    let peeled = format!("{}^{{}}", name);
    refs.iter()
        .find(|r| r.name == peeled)
        .or_else(|| refs.iter().find(|r| r.name == name))
        .map(|r| r.commit.clone())
}
