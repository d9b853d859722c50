use respack::*;

/// RESP-encode one command from string arguments.
fn wire(args: &[&str]) -> Vec<u8> {
    let mut v = format!("*{}\r\n", args.len()).into_bytes();
    for a in args {
        v.extend_from_slice(format!("${}\r\n{}\r\n", a.len(), a).as_bytes());
    }
    v
}

/// Run a full decode -> aggregate -> finalize pass over `input`.
fn compact(input: &[u8]) -> Result<CmdBuffer> {
    let mut dec = Decoder::new();
    let mut agg = Aggregator::new()?;
    // 1 KiB chunks, as the driver feeds them
    for chunk in input.chunks(CHUNK_SIZE) {
        dec.feed(chunk);
        while let Some(cmd) = dec.next_command()? {
            agg.ingest(&cmd)?;
        }
    }
    agg.finish()
}

/// Decode an output buffer back into commands.
fn decode_all(data: &[u8]) -> Vec<Command> {
    let mut dec = Decoder::new();
    dec.feed(data);
    let mut out = Vec::new();
    while let Some(cmd) = dec.next_command().unwrap() {
        out.push(cmd);
    }
    assert_eq!(dec.buffered(), 0, "output must be exact RESP");
    out
}

fn args_of(cmd: &Command) -> Vec<String> {
    cmd.args
        .iter()
        .map(|a| String::from_utf8(a.to_vec()).unwrap())
        .collect()
}

#[test]
fn zincrby_deltas_collapse_to_sums() {
    let mut input = Vec::new();
    input.extend(wire(&["ZINCRBY", "lb", "1", "alice"]));
    input.extend(wire(&["ZINCRBY", "lb", "2", "alice"]));
    input.extend(wire(&["ZINCRBY", "lb", "5", "bob"]));

    let out = compact(&input).unwrap();
    let cmds = decode_all(out.as_slice());
    assert_eq!(cmds.len(), 2);

    let mut scores = std::collections::HashMap::new();
    for cmd in &cmds {
        let a = args_of(cmd);
        assert_eq!(a[0], "ZINCRBY");
        assert_eq!(a[1], "lb");
        scores.insert(a[3].clone(), a[2].parse::<f64>().unwrap());
    }
    assert!((scores["alice"] - 3.0).abs() < 1e-9);
    assert!((scores["bob"] - 5.0).abs() < 1e-9);
}

#[test]
fn zincrby_sum_is_order_independent() {
    let deltas = ["0.5", "2.25", "-1", "10", "0.125"];
    let expected: f64 = deltas.iter().map(|d| d.parse::<f64>().unwrap()).sum();

    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for d in deltas {
        forward.extend(wire(&["ZINCRBY", "k", d, "m"]));
    }
    for d in deltas.iter().rev() {
        backward.extend(wire(&["ZINCRBY", "k", d, "m"]));
    }

    for input in [forward, backward] {
        let out = compact(&input).unwrap();
        let cmds = decode_all(out.as_slice());
        assert_eq!(cmds.len(), 1);
        let a = args_of(&cmds[0]);
        let score: f64 = a[2].parse().unwrap();
        assert!((score - expected).abs() < 1e-9);
    }
}

#[test]
fn sadd_members_deduplicate_per_key() {
    let mut input = Vec::new();
    input.extend(wire(&["SADD", "s", "a", "b"]));
    input.extend(wire(&["SADD", "s", "b", "c"]));

    let out = compact(&input).unwrap();
    let cmds = decode_all(out.as_slice());
    assert_eq!(cmds.len(), 1);

    let a = args_of(&cmds[0]);
    assert_eq!(a[0], "SADD");
    assert_eq!(a[1], "s");
    let mut members = a[2..].to_vec();
    members.sort();
    assert_eq!(members, vec!["a", "b", "c"]);
}

#[test]
fn sadd_keys_stay_separate() {
    let mut input = Vec::new();
    input.extend(wire(&["SADD", "s1", "shared"]));
    input.extend(wire(&["SADD", "s2", "shared", "extra"]));

    let out = compact(&input).unwrap();
    let cmds = decode_all(out.as_slice());
    assert_eq!(cmds.len(), 2);
    for cmd in &cmds {
        let a = args_of(cmd);
        match a[1].as_str() {
            "s1" => assert_eq!(a[2..], ["shared"]),
            "s2" => {
                let mut m = a[2..].to_vec();
                m.sort();
                assert_eq!(m, vec!["extra", "shared"]);
            }
            other => panic!("unexpected key {other}"),
        }
    }
}

#[test]
fn unrecognized_commands_pass_through_unchanged() {
    let input = wire(&["GET", "foo"]);

    let mut dec = Decoder::new();
    let mut agg = Aggregator::new().unwrap();
    dec.feed(&input);
    while let Some(cmd) = dec.next_command().unwrap() {
        agg.ingest(&cmd).unwrap();
    }
    assert_eq!(agg.seen(), 1);
    assert_eq!(agg.aggregated_count(), 0);

    let out = agg.finish().unwrap();
    assert_eq!(out.as_slice(), &input[..]);
    assert_eq!(out.commands(), 1);
}

#[test]
fn wrong_arity_of_recognized_names_passes_through() {
    // ZINCRBY with 3 args and SADD with 2 args are not aggregatable shapes
    let mut input = Vec::new();
    input.extend(wire(&["ZINCRBY", "k", "1"]));
    input.extend(wire(&["SADD", "k"]));

    let out = compact(&input).unwrap();
    assert_eq!(out.as_slice(), &input[..]);
    assert_eq!(out.commands(), 2);
}

#[test]
fn command_names_match_case_insensitively() {
    let mut input = Vec::new();
    input.extend(wire(&["zincrby", "k", "1", "m"]));
    input.extend(wire(&["ZincrBY", "k", "2", "m"]));
    input.extend(wire(&["sadd", "s", "x"]));

    let out = compact(&input).unwrap();
    let cmds = decode_all(out.as_slice());
    assert_eq!(cmds.len(), 2);
    // Canonical names on output regardless of input casing
    let names: Vec<String> = cmds.iter().map(|c| args_of(c)[0].clone()).collect();
    assert!(names.contains(&"ZINCRBY".to_string()));
    assert!(names.contains(&"SADD".to_string()));
}

#[test]
fn passthrough_and_aggregated_commands_coexist() {
    let mut input = Vec::new();
    input.extend(wire(&["SELECT", "0"]));
    input.extend(wire(&["ZINCRBY", "lb", "1", "a"]));
    input.extend(wire(&["SET", "x", "y"]));
    input.extend(wire(&["ZINCRBY", "lb", "1", "a"]));

    let out = compact(&input).unwrap();
    let cmds = decode_all(out.as_slice());
    assert_eq!(cmds.len(), 3);

    // Pass-through commands come first, in arrival order
    assert_eq!(args_of(&cmds[0]), ["SELECT", "0"]);
    assert_eq!(args_of(&cmds[1]), ["SET", "x", "y"]);
    assert_eq!(args_of(&cmds[2]), ["ZINCRBY", "lb", "2", "a"]);
}

#[test]
fn rerunning_on_own_output_is_idempotent() {
    let mut input = Vec::new();
    for i in 0..10 {
        input.extend(wire(&["ZINCRBY", "lb", "1.5", &format!("m{}", i % 3)]));
        input.extend(wire(&["SADD", "s", &format!("m{}", i % 4)]));
    }
    input.extend(wire(&["DEL", "junk"]));

    let first = compact(&input).unwrap();
    let second = compact(first.as_slice()).unwrap();

    assert_eq!(first.commands(), second.commands());

    // Same commands modulo ordering
    let mut a: Vec<Vec<String>> = decode_all(first.as_slice()).iter().map(args_of).collect();
    let mut b: Vec<Vec<String>> = decode_all(second.as_slice()).iter().map(args_of).collect();
    for cmd in a.iter_mut().chain(b.iter_mut()) {
        if cmd[0] == "SADD" {
            cmd[2..].sort();
        }
    }
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

#[test]
fn malformed_framing_aborts_with_no_output() {
    let mut dec = Decoder::new();
    let mut agg = Aggregator::new().unwrap();

    let mut input = wire(&["SET", "a", "b"]);
    input.extend_from_slice(b"*1\r\n$-5\r\nbad\r\n");

    dec.feed(&input);
    let cmd = dec.next_command().unwrap().unwrap();
    agg.ingest(&cmd).unwrap();
    assert_eq!(dec.next_command().unwrap_err(), Error::BadBulkLen(-5));
    // The run aborts here; accumulated state is simply dropped
}

#[test]
fn empty_input_yields_empty_output_error() {
    assert_eq!(compact(b"").unwrap_err(), Error::EmptyOutput);
}

#[test]
fn stats_counters_track_seen_and_aggregated() {
    let mut input = Vec::new();
    input.extend(wire(&["ZINCRBY", "lb", "1", "a"]));
    input.extend(wire(&["ZINCRBY", "lb", "1", "a"]));
    input.extend(wire(&["SADD", "s", "x", "y"]));
    input.extend(wire(&["PING"]));

    let mut dec = Decoder::new();
    let mut agg = Aggregator::new().unwrap();
    dec.feed(&input);
    while let Some(cmd) = dec.next_command().unwrap() {
        agg.ingest(&cmd).unwrap();
    }

    assert_eq!(agg.seen(), 4);
    // One ZINCRBY pair + one SADD key
    assert_eq!(agg.aggregated_count(), 2);
}
