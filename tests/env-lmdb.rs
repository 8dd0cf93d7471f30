// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::{
    cell::RefCell,
    fs,
    path::Path,
    rc::Rc,
};

use slmdb::{
    backend::LmdbEnvironment,
    CursorOp,
    EnvironmentFlags,
    Notification,
    OpenFlags,
    SessionFlags,
    SizeLimits,
    Slmdb,
    SlmdbBuilder,
    StoreError,
    WriteFlags,
};
use tempfile::Builder;

fn open(path: &Path, limits: SizeLimits, env_flags: EnvironmentFlags, session_flags: SessionFlags) -> Slmdb<LmdbEnvironment> {
    SlmdbBuilder::from_limits(limits).open(path, OpenFlags::empty(), env_flags, session_flags).expect("opened")
}

#[test]
fn test_open_missing_directory() {
    let root = Builder::new().prefix("test_open_missing_directory").tempdir().expect("tempdir");
    let nope = root.path().join("nope/");
    let result = SlmdbBuilder::from_limits(SizeLimits::default()).open::<LmdbEnvironment>(
        &nope,
        OpenFlags::empty(),
        EnvironmentFlags::empty(),
        SessionFlags::empty(),
    );
    match result {
        Err(StoreError::UnsuitableEnvironmentPath(path)) => assert_eq!(path, nope),
        _ => panic!("expected error"),
    }
}

#[test]
fn test_scenario() {
    let root = Builder::new().prefix("test_scenario").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let mut session = open(root.path(), SizeLimits::default(), EnvironmentFlags::empty(), SessionFlags::BULK);
    session.put(b"a", b"1", WriteFlags::empty()).expect("put");
    session.put(b"b", b"2", WriteFlags::empty()).expect("put");
    assert_eq!(session.get(b"b").expect("get"), Some(b"2".to_vec()));
    session.close().expect("closed");

    let mut session = open(root.path(), SizeLimits::default(), EnvironmentFlags::empty(), SessionFlags::empty());
    assert_eq!(session.get(b"a").expect("get"), Some(b"1".to_vec()));
    assert_eq!(session.get(b"c").expect("get"), None);
    assert!(!session.put(b"a", b"3", WriteFlags::NO_OVERWRITE).expect("put"));
    assert!(session.delete(b"b").expect("delete"));
    assert!(!session.delete(b"b").expect("delete"));
    assert!(session.fd() > 0);
    session.close().expect("closed");
}

#[test]
fn test_map_grows() {
    let root = Builder::new().prefix("test_map_grows").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let notifications = Rc::new(RefCell::new(vec![]));
    let sink = notifications.clone();
    let mut session: Slmdb<LmdbEnvironment> = SlmdbBuilder::init(64 * 1024, 2, 16 * 1024 * 1024)
        .notify_fn(move |_, notification| sink.borrow_mut().push(notification))
        .open(root.path(), OpenFlags::empty(), EnvironmentFlags::empty(), SessionFlags::empty())
        .expect("opened");

    let value = vec![9u8; 16 * 1024];
    for i in 0..32u8 {
        assert!(session.put(&[i], &value, WriteFlags::empty()).expect("put"));
    }
    assert!(session.curr_limit() > 64 * 1024);
    assert!(!notifications.borrow().is_empty());
    assert!(notifications.borrow().iter().all(|n| matches!(n, Notification::MapFull { .. })));
    for i in 0..32u8 {
        assert_eq!(session.get(&[i]).expect("get"), Some(value.clone()));
    }
    session.close().expect("closed");
}

#[test]
fn test_bulk_restarts_on_growth() {
    let root = Builder::new().prefix("test_bulk_restarts").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let mut session: Slmdb<LmdbEnvironment, usize> =
        SlmdbBuilder::with_context(SizeLimits::new(64 * 1024, 2, 16 * 1024 * 1024), 0)
            .restart_fn(|restarts: &mut usize| *restarts += 1)
            .open(root.path(), OpenFlags::empty(), EnvironmentFlags::empty(), SessionFlags::BULK)
            .expect("opened");

    let value = vec![5u8; 16 * 1024];
    session
        .bulk(|session| {
            for i in 0..32u8 {
                session.put(&[i], &value, WriteFlags::empty())?;
            }
            Ok(())
        })
        .expect("bulk");
    assert!(*session.context() > 0);
    session.close().expect("closed");

    let mut session = open(root.path(), SizeLimits::default(), EnvironmentFlags::READ_ONLY, SessionFlags::empty());
    let mut count = 0;
    let mut op = CursorOp::First;
    while let Some((_, v)) = session.cursor_get(op).expect("cursor") {
        assert_eq!(v, value);
        count += 1;
        op = CursorOp::Next;
    }
    assert_eq!(count, 32);
}

#[test]
fn test_cursor_resumes_without_lock() {
    let root = Builder::new().prefix("test_cursor_no_lock").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let mut session = open(root.path(), SizeLimits::default(), EnvironmentFlags::NO_LOCK, SessionFlags::empty());
    for key in &["k1", "k2", "k3"] {
        session.put(key.as_bytes(), b"v", WriteFlags::empty()).expect("put");
    }

    let mut keys = vec![];
    let mut op = CursorOp::First;
    while let Some((key, _)) = session.cursor_get(op).expect("cursor") {
        keys.push(key);
        op = CursorOp::Next;
    }
    assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec(), b"k3".to_vec()]);

    assert_eq!(session.cursor_get_at(CursorOp::SetRange, b"k2").expect("range").map(|(k, _)| k), Some(b"k2".to_vec()));
    assert_eq!(session.cursor_get(CursorOp::Next).expect("next").map(|(k, _)| k), Some(b"k3".to_vec()));
}

#[test]
fn test_assert_fn_installed() {
    let root = Builder::new().prefix("test_assert_fn").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let mut session: Slmdb<LmdbEnvironment> = SlmdbBuilder::from_limits(SizeLimits::default())
        .assert_fn(|msg| panic!("assertion: {}", msg))
        .open(root.path(), OpenFlags::empty(), EnvironmentFlags::empty(), SessionFlags::empty())
        .expect("opened");
    session.put(b"k", b"v", WriteFlags::empty()).expect("put");

    // Replacing it is fine outside a transaction.
    session.set_assert_fn(None).expect("cleared");
}

#[test]
fn test_get_while_cursor_open() {
    let root = Builder::new().prefix("test_get_while_cursor_open").tempdir().expect("tempdir");
    fs::create_dir_all(root.path()).expect("dir created");

    let mut session = open(root.path(), SizeLimits::default(), EnvironmentFlags::empty(), SessionFlags::empty());
    for key in &["k1", "k2", "k3"] {
        session.put(key.as_bytes(), key.as_bytes(), WriteFlags::empty()).expect("put");
    }

    assert_eq!(session.cursor_get(CursorOp::First).expect("first").map(|(k, _)| k), Some(b"k1".to_vec()));
    assert_eq!(session.get(b"k3").expect("get"), Some(b"k3".to_vec()));
    assert_eq!(session.cursor_get(CursorOp::Next).expect("next").map(|(k, _)| k), Some(b"k2".to_vec()));
}
