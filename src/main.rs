use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use nalgebra::Vector3;

use rust_vps::atlas::Map;
use rust_vps::config::{ConfigStore, Param};
use rust_vps::geometry::{Geodetic, ecef_to_wgs84, map_to_ecef, wgs84_to_ecef};
use rust_vps::io::load_map;
use rust_vps::system::{LogCallbackSlot, init_logging};

const USAGE: &str = "usage:
  rust_vps inspect <map.vpsmap>
  rust_vps map2wgs <map.vpsmap> <x> <y> <z>
  rust_vps ecef2wgs <x> <y> <z>
  rust_vps wgs2ecef <lat> <lon> <alt>
  rust_vps config [config.yaml]";

fn parse_triple(args: &[String]) -> Result<Vector3<f64>> {
    if args.len() != 3 {
        bail!("expected 3 numbers, got {}\n{}", args.len(), USAGE);
    }
    let mut v = [0.0; 3];
    for (dst, arg) in v.iter_mut().zip(args) {
        *dst = arg
            .parse()
            .with_context(|| format!("'{}' is not a number", arg))?;
    }
    Ok(Vector3::from(v))
}

fn inspect(path: &Path) -> Result<()> {
    let map = Map::new(load_map(path)?, path.display().to_string());
    let t = *map.map_to_ecef();

    println!("Map: {}", map.source_id());
    println!("Points: {}", map.num_points());
    if let Some((lo, hi)) = map.bounds() {
        println!(
            "Bounds: [{:.2}, {:.2}, {:.2}] .. [{:.2}, {:.2}, {:.2}]",
            lo.x, lo.y, lo.z, hi.x, hi.y, hi.z
        );
    }

    println!("Map-to-ECEF:");
    for row in t.to_row_major().chunks(4) {
        println!(
            "  {:>16.6} {:>16.6} {:>16.6} {:>16.6}",
            row[0], row[1], row[2], row[3]
        );
    }

    match t.similarity() {
        Ok(sim3) => println!("Scale: {:.6}", sim3.scale),
        Err(e) => println!("WARNING: transform is not a similarity: {}", e),
    }

    let origin = ecef_to_wgs84(&t.origin_ecef());
    println!(
        "Origin: lat {:.8}, lon {:.8}, alt {:.3} m",
        origin.latitude, origin.longitude, origin.altitude
    );
    Ok(())
}

fn print_config(path: Option<&Path>) -> Result<()> {
    let store = ConfigStore::new();
    if let Some(path) = path {
        store.load_yaml(path)?;
    }
    for p in Param::ALL {
        println!("{:<28} {}", p.name(), store.get(p));
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging("info", Arc::new(LogCallbackSlot::new()))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match (command.as_str(), &args[1..]) {
        ("inspect", [path]) => inspect(Path::new(path)),
        ("map2wgs", [path, rest @ ..]) => {
            let map = load_map(Path::new(path))?;
            let p = parse_triple(rest)?;
            let geo = ecef_to_wgs84(&map_to_ecef(&p, &map.map_to_ecef));
            println!("{:.9} {:.9} {:.4}", geo.latitude, geo.longitude, geo.altitude);
            Ok(())
        }
        ("ecef2wgs", rest) => {
            let geo = ecef_to_wgs84(&parse_triple(rest)?);
            println!("{:.9} {:.9} {:.4}", geo.latitude, geo.longitude, geo.altitude);
            Ok(())
        }
        ("wgs2ecef", rest) => {
            let v = parse_triple(rest)?;
            let ecef = wgs84_to_ecef(&Geodetic::new(v.x, v.y, v.z));
            println!("{:.4} {:.4} {:.4}", ecef.x, ecef.y, ecef.z);
            Ok(())
        }
        ("config", []) => print_config(None),
        ("config", [path]) => print_config(Some(Path::new(path))),
        _ => bail!("unknown command '{}'\n{}", command, USAGE),
    }
}
