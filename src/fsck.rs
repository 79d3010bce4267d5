//! Consistency checking.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::inode::parse_inode_id;
use crate::namespace::Dir;
use crate::session::Session;

/// Checks a repository for cross-references that no longer resolve.
///
/// Walks every directory's ls entries; each file target must name an inode
/// present in the inode table. One line is written per issue
/// (`missing inode 'iN'`), and the report terminates with `done; all ok`
/// or `done; N errors`.
///
/// # Arguments
///
/// * `repo_path` - The repository directory.
/// * `out` - Where the report lines are written.
///
/// # Returns
///
/// The number of issues found.
pub fn fsck<P: AsRef<Path>, W: Write>(repo_path: P, out: &mut W) -> Result<usize> {
    let sess = Session::open(repo_path, false)?;
    let root = sess.get_root()?;

    let mut errors = 0;
    check_dir(&sess, &root, out, &mut errors)?;

    if errors == 0 {
        writeln!(out, "done; all ok")?;
    } else {
        writeln!(out, "done; {} errors", errors)?;
    }
    Ok(errors)
}

fn check_dir<W: Write>(
    sess: &Session,
    dir: &Dir<'_>,
    out: &mut W,
    errors: &mut usize,
) -> Result<()> {
    for (name, target) in dir.entries()? {
        if target == "/" {
            let child = dir.get(&name)?.into_dir()?;
            check_dir(sess, &child, out, errors)?;
        } else if let Some(number) = parse_inode_id(&target) {
            if !sess.inode_table().contains(number)? {
                writeln!(out, "missing inode 'i{}'", number)?;
                *errors += 1;
            }
        } else {
            writeln!(out, "bad ls target '{}' for entry '{}'", target, name)?;
            *errors += 1;
        }
    }
    Ok(())
}
