use arcade_core::boards;
use arcade_core::debug_flags;
use arcade_core::savestate;
use arcade_core::Machine;
use std::env;
use std::path::PathBuf;
use std::process;

// Runs a board without video or audio and prints a state checksum.
//   cargo run --release --bin headless_test -- --board twin-z80 --rom main.bin --rom sound.bin --frames 600
// HEADLESS_FRAMES sets the default frame count.

struct Options {
    board: String,
    roms: Vec<PathBuf>,
    frames: u32,
    save_state: Option<String>,
    load_state: Option<String>,
    pressed: Vec<(usize, u8)>,
}

fn parse_u32_hex_or_dec(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x") {
        u32::from_str_radix(stripped, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --board <{}> --rom <file> [--rom <file>...] [--frames N] \
         [--press PORT:BIT] [--load-state FILE] [--save-state FILE]",
        program,
        boards::BOARD_NAMES.join("|")
    );
    process::exit(2);
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "headless_test".to_string());
    let mut opts = Options {
        board: String::new(),
        roms: Vec::new(),
        frames: debug_flags::headless_frames(),
        save_state: None,
        load_state: None,
        pressed: Vec::new(),
    };
    while let Some(a) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{} requires a value", flag));
        match a.as_str() {
            "--board" => opts.board = value("--board")?,
            "--rom" => opts.roms.push(PathBuf::from(value("--rom")?)),
            "--frames" => {
                let v = value("--frames")?;
                opts.frames =
                    parse_u32_hex_or_dec(&v).ok_or_else(|| format!("bad frame count '{}'", v))?;
            }
            "--press" => {
                let v = value("--press")?;
                let (port, bit) = v
                    .split_once(':')
                    .and_then(|(p, b)| Some((p.parse::<usize>().ok()?, b.parse::<u8>().ok()?)))
                    .ok_or_else(|| format!("--press expects PORT:BIT, got '{}'", v))?;
                opts.pressed.push((port, bit));
            }
            "--save-state" => opts.save_state = Some(value("--save-state")?),
            "--load-state" => opts.load_state = Some(value("--load-state")?),
            "--help" | "-h" => usage(&program),
            other => return Err(format!("Unknown option: {}", other)),
        }
    }
    if opts.board.is_empty() {
        return Err("--board is required".to_string());
    }
    if opts.roms.is_empty() {
        return Err("at least one --rom is required".to_string());
    }
    Ok(opts)
}

fn resolve_rom_path(p: &PathBuf) -> Result<PathBuf, String> {
    if p.exists() {
        return Ok(p.clone());
    }
    let alt = PathBuf::from("roms").join(p);
    if alt.exists() {
        return Ok(alt);
    }
    Err(format!("ROM not found: {:?} (also tried {:?})", p, alt))
}

fn run(opts: &Options) -> Result<(), String> {
    let mut machine = boards::create(&opts.board)?;

    let mut images = Vec::with_capacity(opts.roms.len());
    for rom in &opts.roms {
        let path = resolve_rom_path(rom)?;
        let data =
            std::fs::read(&path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        log::info!("loaded {:?} ({} bytes)", path, data.len());
        images.push(data);
    }
    machine.load_roms(&images)?;
    machine.reset();

    if let Some(file) = &opts.load_state {
        machine.load_state(&savestate::load_from_file(file)?)?;
    }
    for &(port, bit) in &opts.pressed {
        machine.set_input(port, bit, true);
    }

    for _ in 0..opts.frames {
        machine.run_frame();
    }

    let state = machine.save_state()?;
    if let Some(file) = &opts.save_state {
        savestate::save_to_file(file, &state)?;
    }

    if !debug_flags::quiet() {
        for (i, cpu) in machine.cpus().iter().enumerate() {
            println!(
                "cpu{} {:?}: PC={:04X} SP={:04X} IFF1={} halted={} cycles={}",
                i,
                cpu.model(),
                cpu.pc(),
                cpu.sp(),
                cpu.iff1(),
                cpu.is_halted(),
                cpu.total_cycles()
            );
        }
    }
    println!(
        "{}: {} frames, state checksum {:08X}",
        machine.name(),
        machine.frame_count(),
        savestate::checksum(&state)
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            usage("headless_test");
        }
    };
    if let Err(e) = run(&opts) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
