// Copyright 2025 TideFS Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Slash-separated path helpers. Paths handed to the client surface are
//! absolute; empty components ("//", trailing slash) are ignored.

/// Split an absolute path into its components, root excluded.
pub fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parent directory of `path`; the parent of "/" is "/".
pub fn parent_dir(path: &str) -> String {
    let names = split(path);
    if names.len() <= 1 {
        "/".to_string()
    } else {
        format!("/{}", names[..names.len() - 1].join("/"))
    }
}

/// Final component of `path`; empty for "/".
pub fn filename(path: &str) -> String {
    split(path).last().map(|s| s.to_string()).unwrap_or_default()
}

/// Join a directory and a relative subpath.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
