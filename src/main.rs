#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() {
    if let Err(e) = safewalk_sentinel::run() {
        eprintln!("safewalk-sentinel: {e}");
        std::process::exit(1);
    }
}
