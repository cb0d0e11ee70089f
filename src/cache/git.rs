//! Git plumbing for the results repository.
//!
//! All functions here block; callers run them on the blocking pool.

use crate::error::{BenchError, BenchResult};
use git2::build::CheckoutBuilder;
use git2::{
    Cred, ErrorCode, FetchOptions, IndexAddOption, Oid, Progress, PushOptions, RemoteCallbacks,
    Repository, ResetType, Signature,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, info};

const COMMIT_AUTHOR: &str = "bench-tool";
const COMMIT_EMAIL: &str = "bench-tool@users.noreply.github.com";

fn callbacks_with_token<'a>(token: Option<&'a str>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = token {
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", token)
        });
    }
    callbacks
}

/// Clone `url` into `target`, or open the clone already living there.
pub fn clone_or_open(
    url: &str,
    target: &Path,
    token: Option<&str>,
    show_progress: bool,
) -> BenchResult<Repository> {
    if target.join(".git").exists() {
        info!("Using existing clone at: {}", target.display());
        let repo = Repository::open(target)?;
        rebase_on_origin(&repo, token)?;
        return Ok(repo);
    }

    info!("Cloning results repository: {}", url);

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let mut callbacks = callbacks_with_token(token);
    let pb = progress_bar.clone();
    callbacks.transfer_progress(move |progress: Progress<'_>| {
        if let Some(ref pb) = pb {
            pb.set_length(progress.total_objects() as u64);
            pb.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);

    let repo = builder.clone(url, target).map_err(|e| BenchError::Git {
        message: format!("failed to clone {}: {}", url, e.message()),
    })?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Clone complete");
    }

    info!("Cloned results repository to: {}", target.display());
    Ok(repo)
}

fn current_branch(repo: &Repository) -> BenchResult<String> {
    let head = repo.head()?;
    head.shorthand()
        .filter(|_| head.is_branch())
        .map(String::from)
        .ok_or_else(|| BenchError::Git {
            message: "HEAD is not on a branch".to_string(),
        })
}

/// Fetch `origin` and move the current branch onto its remote counterpart.
///
/// Files of local commits the remote does not have stay in the working
/// tree as untracked files, so the next `commit_all` records them on top
/// of the remote branch.
pub fn rebase_on_origin(repo: &Repository, token: Option<&str>) -> BenchResult<()> {
    let branch = current_branch(repo)?;

    let mut remote = repo.find_remote("origin")?;
    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks_with_token(token));
    remote.fetch::<&str>(&[], Some(&mut fetch_opts), None)?;

    let upstream = match repo.find_reference(&format!("refs/remotes/origin/{}", branch)) {
        Ok(reference) => reference.peel_to_commit()?,
        Err(e) if e.code() == ErrorCode::NotFound => {
            debug!("origin has no branch {}", branch);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let head = repo.head()?.peel_to_commit()?;
    if head.id() == upstream.id() || repo.graph_descendant_of(head.id(), upstream.id())? {
        debug!("{} is up to date with origin", branch);
        return Ok(());
    }

    repo.reset(upstream.as_object(), ResetType::Mixed, None)?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

    info!("Moved {} to origin/{} ({})", branch, branch, upstream.id());
    Ok(())
}

/// Stage everything under `pathspec` and commit it on HEAD.
///
/// Returns `None` when the tree did not change.
pub fn commit_all(repo: &Repository, pathspec: &str, message: &str) -> BenchResult<Option<Oid>> {
    let mut index = repo.index()?;
    index.add_all([pathspec].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;

    let parent = repo.head()?.peel_to_commit()?;
    if parent.tree_id() == tree_id {
        debug!("no changes under {}", pathspec);
        return Ok(None);
    }

    let tree = repo.find_tree(tree_id)?;
    let signature = repo
        .signature()
        .or_else(|_| Signature::now(COMMIT_AUTHOR, COMMIT_EMAIL))?;
    let oid = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &[&parent],
    )?;

    info!("Created commit {}", oid);
    Ok(Some(oid))
}

/// Push the current branch to `origin`.
pub fn push_head(repo: &Repository, token: Option<&str>) -> BenchResult<()> {
    let head = repo.head()?;
    let refname = head.name().ok_or_else(|| BenchError::Git {
        message: "HEAD is not a valid UTF-8 reference".to_string(),
    })?;

    let mut remote = repo.find_remote("origin")?;
    let refspec = format!("{}:{}", refname, refname);
    let mut rejected: Vec<String> = Vec::new();
    {
        let mut callbacks = callbacks_with_token(token);
        callbacks.push_update_reference(|reference, status| {
            if let Some(status) = status {
                rejected.push(format!("{} ({})", reference, status));
            }
            Ok(())
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        remote.push(&[refspec.as_str()], Some(&mut push_opts))?;
    }

    if !rejected.is_empty() {
        return Err(BenchError::Git {
            message: format!("push rejected: {}", rejected.join(", ")),
        });
    }

    info!("Pushed {} to origin", refname);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Bare repository with one commit, usable as a push target.
    pub(crate) fn bare_origin(root: &Path) -> PathBuf {
        let seed_dir = root.join("seed");
        let seed = Repository::init(&seed_dir).unwrap();
        std::fs::write(seed_dir.join("README.md"), "results\n").unwrap();

        let mut index = seed.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = seed.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("seed", "seed@example.com").unwrap();
        seed.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        let bare_dir = root.join("origin.git");
        git2::build::RepoBuilder::new()
            .bare(true)
            .clone(seed_dir.to_str().unwrap(), &bare_dir)
            .unwrap();
        bare_dir
    }

    #[test]
    fn test_clone_commit_push() {
        let root = TempDir::new().unwrap();
        let origin = bare_origin(root.path());
        let work = root.path().join("work");

        let repo = clone_or_open(origin.to_str().unwrap(), &work, None, false).unwrap();
        assert!(commit_all(&repo, "cache", "nothing").unwrap().is_none());

        std::fs::create_dir_all(work.join("cache")).unwrap();
        std::fs::write(work.join("cache/1.json"), "{}").unwrap();
        let oid = commit_all(&repo, "cache", "add 1").unwrap().unwrap();
        push_head(&repo, None).unwrap();

        let bare = Repository::open_bare(&origin).unwrap();
        let pushed = bare.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(pushed.id(), oid);
        assert_eq!(pushed.message(), Some("add 1"));
    }

    fn write_and_commit(repo: &Repository, name: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::create_dir_all(workdir.join("cache")).unwrap();
        std::fs::write(workdir.join("cache").join(name), "{}").unwrap();
        commit_all(repo, "cache", name).unwrap().unwrap()
    }

    #[test]
    fn test_push_of_diverged_branch_fails() {
        let root = TempDir::new().unwrap();
        let origin = bare_origin(root.path());
        let url = origin.to_str().unwrap();

        let first = clone_or_open(url, &root.path().join("first"), None, false).unwrap();
        let second = clone_or_open(url, &root.path().join("second"), None, false).unwrap();

        write_and_commit(&second, "1.json");
        push_head(&second, None).unwrap();

        write_and_commit(&first, "2.json");
        let err = push_head(&first, None).unwrap_err();
        assert!(matches!(err, BenchError::Git { .. }));
    }

    #[test]
    fn test_rebase_on_origin_keeps_local_entries() {
        let root = TempDir::new().unwrap();
        let origin = bare_origin(root.path());
        let url = origin.to_str().unwrap();
        let first_dir = root.path().join("first");

        let first = clone_or_open(url, &first_dir, None, false).unwrap();
        let second = clone_or_open(url, &root.path().join("second"), None, false).unwrap();

        let remote_oid = write_and_commit(&second, "1.json");
        push_head(&second, None).unwrap();
        write_and_commit(&first, "2.json");

        rebase_on_origin(&first, None).unwrap();
        assert_eq!(first.head().unwrap().peel_to_commit().unwrap().id(), remote_oid);
        assert!(first_dir.join("cache/1.json").exists());
        assert!(first_dir.join("cache/2.json").exists());

        let oid = commit_all(&first, "cache", "add 2").unwrap().unwrap();
        push_head(&first, None).unwrap();

        let bare = Repository::open_bare(&origin).unwrap();
        let pushed = bare.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(pushed.id(), oid);
        assert_eq!(pushed.parent_id(0).unwrap(), remote_oid);
    }

    #[test]
    fn test_open_existing_clone() {
        let root = TempDir::new().unwrap();
        let origin = bare_origin(root.path());
        let work = root.path().join("work");

        clone_or_open(origin.to_str().unwrap(), &work, None, false).unwrap();

        // An existing clone fetches from its own origin, not from the given URL.
        let reopened = clone_or_open("unused://url", &work, None, false).unwrap();
        let workdir = reopened.workdir().unwrap().canonicalize().unwrap();
        assert_eq!(workdir, work.canonicalize().unwrap());
    }
}
