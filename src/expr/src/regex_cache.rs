// Copyright 2023 RisingWave Labs
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

//! Dictionary-scan regex cache: given a string
//! column's dictionary and a `(pattern, flags)`, a `bool[M]` match table is
//! computed by scanning the dictionary once; per-row evaluation is then an
//! `O(1)` code lookup. Cached thread-local, keyed by dictionary-pointer
//! identity, and cleared at the start of every node execution on the
//! worker path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rankflow_common::column::Dictionary;
use rankflow_common::error::{EngineError, EngineResult};
use regex::{Regex, RegexBuilder};

type CacheKey = (usize, String, String);

thread_local! {
    static CACHE: RefCell<HashMap<CacheKey, Rc<Vec<bool>>>> = RefCell::new(HashMap::new());
}

/// Clears the worker thread's regex match-table cache. Called once at the
/// start of every node execution on the worker path so
/// that stale entries never leak across requests within the same worker.
pub fn clear_for_node() {
    CACHE.with(|c| c.borrow_mut().clear());
}

/// Compiles `pattern`/`flags` once per (dictionary identity, pattern, flags)
/// and scans `dictionary` exactly once, returning the cached match table.
pub fn dict_scan(dictionary: &Dictionary, pattern: &str, flags: &str) -> EngineResult<Rc<Vec<bool>>> {
    let key = (dictionary.identity(), pattern.to_string(), flags.to_string());

    if let Some(hit) = CACHE.with(|c| c.borrow().get(&key).cloned()) {
        return Ok(hit);
    }

    let regex = compile(pattern, flags)?;
    let table: Vec<bool> = dictionary.entries().iter().map(|s| regex.is_match(s)).collect();
    let table = Rc::new(table);

    CACHE.with(|c| c.borrow_mut().insert(key, Rc::clone(&table)));
    Ok(table)
}

fn compile(pattern: &str, flags: &str) -> EngineResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    match flags {
        "" => {}
        "i" => {
            builder.case_insensitive(true);
        }
        other => {
            return Err(EngineError::validation(format!(
                "unsupported regex flags `{other}`, only \"\" and \"i\" are allowed"
            )))
        }
    }
    builder
        .build()
        .map_err(|e| EngineError::evaluation(format!("invalid regex pattern `{pattern}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_dictionary_once_and_caches() {
        let dict = Dictionary::new(vec![
            "alpha".into(),
            "beta".into(),
            "gamma".into(),
            "alphabet".into(),
        ]);
        let table = dict_scan(&dict, "^alp", "").unwrap();
        assert_eq!(*table, vec![true, false, false, true]);

        // Second call hits the cache; result is identical.
        let table2 = dict_scan(&dict, "^alp", "").unwrap();
        assert_eq!(table, table2);
    }

    #[test]
    fn case_insensitive_flag() {
        let dict = Dictionary::new(vec!["Alpha".into(), "beta".into()]);
        let table = dict_scan(&dict, "^alpha$", "i").unwrap();
        assert_eq!(*table, vec![true, false]);
    }

    #[test]
    fn rejects_unsupported_flags() {
        let dict = Dictionary::new(vec!["x".into()]);
        assert!(dict_scan(&dict, "x", "m").is_err());
    }

    #[test]
    fn clear_for_node_drops_cache() {
        let dict = Dictionary::new(vec!["x".into()]);
        dict_scan(&dict, "x", "").unwrap();
        clear_for_node();
        // Not directly observable from outside, but must not panic and must
        // recompute correctly afterwards.
        let table = dict_scan(&dict, "x", "").unwrap();
        assert_eq!(*table, vec![true]);
    }
}
