// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Load random entries into an LMDB database in one bulk transaction, starting
//! from the smallest map so that it has to grow, then count them with the
//! session cursor.
//!
//! Usage: rand [-n <keys>] [-t] <path>

use std::{
    env::args,
    fs::{
        create_dir_all,
        File,
    },
    io::Read,
    path::Path,
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
    WriteFlags,
    SLMDB_FUDGE,
};

fn main() {
    let mut args = args();
    let mut num_keys = None;
    let mut open_flags = OpenFlags::empty();
    let mut path = None;

    // The first arg is the name of the program, which we can ignore.
    args.next();

    while let Some(arg) = args.next() {
        if &arg[0..1] == "-" {
            match &arg[1..] {
                "n" => {
                    num_keys = match args.next().map(|n| n.parse::<usize>()) {
                        Some(Ok(n)) => Some(n),
                        _ => panic!("-n must be followed by a number of keys"),
                    };
                },
                "t" => open_flags |= OpenFlags::TRUNCATE,
                str => panic!("arg -{} not recognized", str),
            }
        } else {
            if path.is_some() {
                panic!("must provide only one path to the LMDB environment");
            }
            path = Some(arg);
        }
    }

    let path = path.expect("must provide a path to the LMDB environment");
    create_dir_all(&path).expect("dir created");

    // Generate random values for the number of keys and key/value lengths.
    // On Linux, "Just use /dev/urandom!" <https://www.2uo.de/myths-about-urandom/>.
    let mut random = File::open("/dev/urandom").expect("urandom");
    let mut nums = [0u8; 5];
    random.read_exact(&mut nums).expect("random bytes");
    let num_keys = num_keys.unwrap_or(usize::from(nums[0]));

    let mut keys = Vec::with_capacity(num_keys);
    for _ in 0..num_keys {
        // The key must be 1–511 bytes long; values are 0–0xffff bytes.
        let key_len = ((u16::from(nums[1]) + (u16::from(nums[2]) << 8)) % 511 + 1) as usize;
        let value_len = (u16::from(nums[3]) + (u16::from(nums[4]) << 8)) as usize;

        let mut key = vec![0; key_len];
        random.read_exact(&mut key).expect("random key");
        let mut value = vec![0; value_len];
        random.read_exact(&mut value).expect("random value");
        keys.push((key, value));
    }

    let mut session: Slmdb<LmdbEnvironment, usize> =
        SlmdbBuilder::with_context(SizeLimits::new(SLMDB_FUDGE, 2, usize::MAX), 0)
            .restart_fn(|restarts: &mut usize| *restarts += 1)
            .notify_fn(|_, notification| match notification {
                Notification::MapFull {
                    new_limit,
                } => println!("map full, growing to {}", new_limit),
                Notification::MapResized {
                    new_limit,
                } => println!("map resized to {}", new_limit),
                Notification::ReadersFull => println!("reader table full"),
            })
            .open(Path::new(&path), open_flags, EnvironmentFlags::empty(), SessionFlags::BULK)
            .expect("opened");
    println!("initial map size {}", session.curr_limit());

    session
        .bulk(|session| {
            for (key, value) in &keys {
                session.put(key, value, WriteFlags::empty())?;
            }
            Ok(())
        })
        .expect("loaded");
    let restarts = *session.context();
    session.close().expect("committed");

    let mut session: Slmdb<LmdbEnvironment> = SlmdbBuilder::init(SLMDB_FUDGE, 2, usize::MAX)
        .open(Path::new(&path), OpenFlags::empty(), EnvironmentFlags::READ_ONLY, SessionFlags::empty())
        .expect("reopened");
    let mut count = 0;
    let mut op = CursorOp::First;
    while session.cursor_get(op).expect("cursor").is_some() {
        count += 1;
        op = CursorOp::Next;
    }
    println!("{} entries, {} restarts, map size {}", count, restarts, session.curr_limit());
    session.close().expect("closed");
}
