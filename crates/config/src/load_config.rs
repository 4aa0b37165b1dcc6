// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::path::PathBuf;

use path_clean::clean;

pub type FindInParent = fn(&PathBuf, &str) -> Option<PathBuf>;

/// Look for `filename` in `path` and each of its ancestors
pub fn find_in_parent(path: &PathBuf, filename: &str) -> Option<PathBuf> {
    path.ancestors()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

pub fn resolve_config_path<P: Into<PathBuf>>(
    find_in_parent: FindInParent,
    cwd: P,
    default_config_dir: P,
    default_filename: &str,
    cli_file: Option<P>,
) -> PathBuf {
    let cli_file: Option<PathBuf> = cli_file.map(Into::into);
    let default_config_dir = default_config_dir.into();
    let cwd = cwd.into();

    match cli_file {
        Some(cli_file) if cli_file.is_absolute() => cli_file,
        Some(cli_file) => clean(cwd.join(cli_file)),
        // walk up from cwd, then fall back to the os config dir
        None => find_in_parent(&cwd, default_filename)
            .unwrap_or_else(|| clean(default_config_dir.join(default_filename))),
    }
}
