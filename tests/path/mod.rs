// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::env;
use std::path::Path;

use anyhow::{bail, Result};
use schemapath::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;
use walkdir::WalkDir;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    query: String,
    want_result: Option<Value>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    records: Value,
    cases: Vec<TestCase>,
}

fn display_diff(computed: &Value, expected: &Value) -> Result<String> {
    let c = serde_json::to_string_pretty(computed)?;
    let e = serde_json::to_string_pretty(expected)?;
    Ok(format!(
        "\nleft  = {c}\nright = {e}\ndiff  = {}\n",
        prettydiff::diff_chars(&e, &c)
    ))
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;
    let records = RecordSet::from_value(&test.records)?;
    let resolver = PathResolver::new(&records);

    println!("running {file}");

    for case in test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => panic!("either want_result or error must be specified in test case."),
        }

        match resolver.query(&case.query) {
            Ok(computed) => match &case.want_result {
                Some(expected) if computed == *expected => (),
                Some(expected) => bail!(
                    "{}: mismatch for `{}`{}",
                    case.note,
                    case.query,
                    display_diff(&computed, expected)?
                ),
                None => bail!("{}: `{}` succeeded with {computed}", case.note, case.query),
            },
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!(
                            "Error message\n`{}\n`\ndoes not contain `{}`",
                            actual,
                            expected
                        );
                    }
                    println!("{actual}");
                }
                None => bail!("{}: `{}` failed: {actual}", case.note, case.query),
            },
        }

        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/path/cases/*.yaml")]
fn run(path: &str) {
    crate::common::init_tracing();
    yaml_test(path).unwrap()
}

#[test]
#[ignore = "intended for running a single yaml file or directory"]
fn one_yaml() -> Result<()> {
    let mut files = vec![];
    for a in env::args() {
        if a.ends_with(".yaml") {
            files.push(a);
        } else if Path::new(&a).is_dir() {
            for entry in WalkDir::new(&a)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path().to_string_lossy().to_string();
                if entry.path().is_file() && path.ends_with(".yaml") {
                    files.push(path);
                }
            }
        }
    }

    if files.is_empty() {
        bail!("missing <yaml-file> or <directory>");
    }

    for file in files {
        yaml_test(&file)?;
    }
    Ok(())
}
