//! End-to-end cycles over a fake procfs tree.

use psjungle::{
    CycleContext, DryRunSender, MatchOptions, Matcher, ProcFs, RenderOptions, Renderer, Signal,
    Snapshot, SnapshotFile, Specifier,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_proc(root: &Path, pid: u32, name: &str, ppid: u32, rss_kb: u64, cmdline: &[&str]) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(dir.join("fd")).unwrap();
    fs::write(
        dir.join("status"),
        format!("Name:\t{name}\nState:\tS (sleeping)\nPPid:\t{ppid}\nVmRSS:\t{rss_kb} kB\n"),
    )
    .unwrap();
    fs::write(
        dir.join("stat"),
        format!("{pid} ({name}) S {ppid} 1 1 0 -1 0 0 0 0 0 100 100 0 0 20 0 1 0 0 0 0"),
    )
    .unwrap();
    let mut raw = Vec::new();
    for arg in cmdline {
        raw.extend_from_slice(arg.as_bytes());
        raw.push(0);
    }
    fs::write(dir.join("cmdline"), raw).unwrap();
}

const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 5555 1 0000000000000000 100 0 0 10 0
";

fn fake_proc(root: &Path) {
    write_proc(root, 1, "systemd", 0, 12_000, &["/sbin/init"]);
    write_proc(root, 300, "node", 1, 15_000, &["node", "server.js"]);
    write_proc(root, 301, "node", 300, 900, &["node", "worker.js"]);
    write_proc(root, 400, "bash", 1, 4_000, &[]);

    fs::create_dir_all(root.join("net")).unwrap();
    fs::write(root.join("net/tcp"), TCP).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("socket:[5555]", root.join("300/fd/7")).unwrap();
}

fn context<'a>(procfs: &'a ProcFs, spec: Specifier, host: Option<&str>) -> CycleContext<'a> {
    CycleContext {
        processes: procfs,
        connections: procfs,
        specifiers: vec![spec],
        matcher: Matcher::new(MatchOptions {
            host: host.map(str::to_string),
            self_pid: 0,
            ..MatchOptions::default()
        }),
        renderer: Renderer::new(RenderOptions {
            flat: false,
            color: false,
        }),
        signal: Some(Signal::Kill),
        sender: &DryRunSender,
    }
}

#[cfg(unix)]
#[test]
fn test_port_cycle() {
    let dir = tempdir().unwrap();
    fake_proc(dir.path());
    let procfs = ProcFs::new(dir.path());

    let mut out: Vec<u8> = Vec::new();
    let processed = context(&procfs, Specifier::Port(8080), Some("localhost"))
        .run_cycle(&mut out)
        .unwrap();

    assert_eq!(processed, vec![300]);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "1 0.0 12.0MB /sbin/init\n\
         └── 300 0.0 15.0MB node server.js\n    \
         └── 301 0.0 900KB node worker.js\n\
         Would send signal 9 to PID 300\n"
    );
}

#[test]
fn test_pattern_cycle_uses_name_without_cmdline() {
    let dir = tempdir().unwrap();
    fake_proc(dir.path());
    let procfs = ProcFs::new(dir.path());

    let mut out: Vec<u8> = Vec::new();
    let processed = context(&procfs, Specifier::Pattern("^bash$".into()), None)
        .run_cycle(&mut out)
        .unwrap();

    assert_eq!(processed, vec![400]);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("└── 400 0.0 4.00MB bash\n"));
}

#[test]
fn test_dump_and_reload_snapshot() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("proc");
    fake_proc(&root);
    let procfs = ProcFs::new(&root);

    let path = dir.path().join("snapshot.json");
    SnapshotFile::capture(&procfs, &procfs)
        .unwrap()
        .save(&path)
        .unwrap();

    let reloaded = SnapshotFile::load(&path).unwrap();
    let live = Snapshot::capture(&procfs).unwrap();
    let replay = Snapshot::capture(&reloaded).unwrap();
    assert_eq!(live.len(), replay.len());
    assert_eq!(replay.children_of(300), &[301]);
    assert_eq!(replay.get(300).unwrap().cmdline, "node server.js");
}
