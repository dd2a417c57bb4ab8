//! DSF inspector - verifies a DSF file and prints its structure.
//!
//! Usage: cargo run --release --bin inspect_dsf -- <FILE.dsf> [--commands]
//!
//! Prints the atom tree with sizes, the properties, the definition tables,
//! per-pool point counts and scales, raster layers and a command summary.
//! With `--commands` every decoded command is listed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use orthodsf::core::logging;
use orthodsf::dsf::{decode_commands, AtomInfo, Command, DsfFile};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.iter().skip(1).find(|a| !a.starts_with("--")).map(PathBuf::from) else {
        eprintln!("Usage: inspect_dsf <FILE.dsf> [--commands]");
        return ExitCode::from(2);
    };
    let list_commands = args.iter().any(|a| a == "--commands");

    let file = match DsfFile::read(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("=== {} ===", path.display());
    println!("Checksum: OK");
    println!();
    println!("Atoms:");
    for atom in &file.atoms {
        print_atom(atom, 1);
    }

    println!();
    println!("Properties:");
    for (key, value) in &file.properties {
        println!("  {} = {}", key, value);
    }

    println!();
    println!("Terrains: {}", file.terrains.len());
    for (i, name) in file.terrains.iter().enumerate() {
        println!("  {:4} {}", i, name);
    }
    println!(
        "Objects: {}, polygons: {}, networks: {}, rasters: {}",
        file.objects.len(),
        file.polygons.len(),
        file.networks.len(),
        file.raster_names.len()
    );

    println!();
    println!("Point pools: {}", file.pools.len());
    for (i, pool) in file.pools.iter().enumerate() {
        let scales: Vec<String> = pool
            .scales
            .iter()
            .take(3)
            .map(|(s, o)| format!("{}@{}", s, o))
            .collect();
        println!(
            "  {:4} {:6} points x {} planes  [{}]",
            i,
            pool.count,
            pool.planes.len(),
            scales.join(", ")
        );
    }

    for (i, (layer, name)) in file.rasters.iter().zip(file.raster_names.iter()).enumerate() {
        println!(
            "Raster {} `{}`: {}x{}, {} bytes/pixel, flags {:#x}, scale {}, offset {}",
            i, name, layer.width, layer.height, layer.bytes_per_pixel, layer.flags, layer.scale, layer.offset
        );
    }

    println!();
    let commands = match decode_commands(&file.commands) {
        Ok(commands) => commands,
        Err(e) => {
            eprintln!("Commands: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut per_terrain: BTreeMap<u16, (usize, usize)> = BTreeMap::new();
    let mut terrain = 0u16;
    for cmd in &commands {
        if list_commands {
            println!("  {:?}", cmd);
        }
        match cmd {
            Command::SetDefinition(id) => terrain = *id,
            Command::Triangles(slots) => per_terrain.entry(terrain).or_default().0 += slots.len() / 3,
            Command::CrossPoolTriangles(corners) => per_terrain.entry(terrain).or_default().1 += corners.len() / 3,
            Command::PoolSelect(_) | Command::PatchFlags { .. } => {}
        }
    }
    println!("Commands: {} ({} bytes)", commands.len(), file.commands.len());
    for (id, (same, cross)) in &per_terrain {
        let name = file.terrains.get(*id as usize).map(String::as_str).unwrap_or("?");
        println!("  {:4} {:8} triangles, {:6} cross-pool  {}", id, same + cross, cross, name);
    }

    ExitCode::SUCCESS
}

fn print_atom(atom: &AtomInfo, depth: usize) {
    println!("{}{} {} bytes", "  ".repeat(depth), atom.tag, atom.len);
    for child in &atom.children {
        print_atom(child, depth + 1);
    }
}
