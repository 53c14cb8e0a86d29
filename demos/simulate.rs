use std::io::{self, StdoutLock, Write};

use analytic_orbits::{
    Body, BodyId, Initialization, SimulationContext, SolarSystem, SystemError, TimeWarp,
};
use glam::DVec3;

const SIMULATION_TICKS: u64 = 20_000;
const FRAME_TIME: f64 = 1.0 / 60.0;
const REPORT_EVERY: u64 = 1_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(io::stderr)
        .init();

    let (mut system, ship, home) = generate_solar_system()?;
    describe_system(&system);

    // Burn prograde towards the moon's orbit
    let burn = {
        let orbit = system
            .get_body(ship)
            .and_then(|body| body.orbit.as_ref())
            .ok_or(SystemError::NotOrbiting(ship))?;
        orbit.velocity().normalize() * 0.35
    };
    if let Some(orbit) = system.get_body_mut(ship).and_then(|body| body.orbit.as_mut()) {
        orbit.apply_delta_velocity(burn)?;
    }

    if let Some(moon) = system.get_body_id_with_name("Moon") {
        match system.encounter_anomaly(ship, moon)? {
            Some(theta) => eprintln!("Moon encounter predicted at true anomaly {theta:.4}"),
            None => eprintln!("No moon encounter within one orbit"),
        }
    }
    if let Some(t) = system.time_until_soi_exit(ship)? {
        eprintln!("Leaving {home}'s SOI in {t:.2} time units");
    }

    let mut warp = TimeWarp::default();
    warp.set_index(2);

    let mut lock = io::stdout().lock();
    eprintln!("Simulating {SIMULATION_TICKS} ticks at {}x...", warp.multiplier());
    for t in 0..SIMULATION_TICKS {
        let report = system.tick(warp.scale(FRAME_TIME));

        for transition in &report.soi_transitions {
            let name = |id: Option<BodyId>| {
                id.and_then(|id| system.get_body(id))
                    .map_or("nothing", |body| body.name.as_str())
            };
            writeln!(
                &mut lock,
                "t={:.2}: {} moved from {} to {}",
                system.time,
                name(Some(transition.body)),
                name(transition.from),
                name(Some(transition.to)),
            )?;
        }

        if t % REPORT_EVERY == 0 {
            writeln!(&mut lock, "=== Tick {t} (t={:.2}) ===", system.time)?;
            print_all_body_positions(&mut lock, &system)?;
        }
    }

    Ok(())
}

/// A star with two planets, a moon around the inner planet and a ship in
/// low orbit around that planet.
fn generate_solar_system() -> Result<(SolarSystem, BodyId, &'static str), SystemError> {
    let mut system = SolarSystem::new(SimulationContext::default());

    let sun = system.add_body(
        Body::new("Sun".to_string(), 1000.0, 5.0, f64::INFINITY, DVec3::ZERO),
        None,
    )?;

    let home_position = DVec3::new(100.0, 0.0, 0.0);
    let home = system.add_body(
        Body::new("Home".to_string(), 10.0, 1.0, 20.0, home_position),
        None,
    )?;
    system.place_in_orbit(home, sun, home_position, Initialization::CircularOrbit)?;

    let moon_position = home_position + DVec3::new(8.0, 0.0, 0.0);
    let moon = system.add_body(
        Body::new("Moon".to_string(), 0.5, 0.3, 2.0, moon_position),
        None,
    )?;
    system.place_in_orbit(moon, home, moon_position, Initialization::CircularOrbit)?;

    let outer_position = DVec3::new(0.0, 0.0, -250.0);
    let outer = system.add_body(
        Body::new("Outer".to_string(), 30.0, 2.0, 50.0, outer_position),
        None,
    )?;
    system.place_in_orbit(outer, sun, outer_position, Initialization::CircularOrbit)?;

    let ship_position = home_position + DVec3::new(-3.0, 0.0, 0.0);
    let ship = system.add_body(Body::vessel("Ship".to_string(), ship_position), None)?;
    system.place_in_orbit(ship, home, ship_position, Initialization::CircularOrbit)?;

    Ok((system, ship, "Home"))
}

fn describe_system(system: &SolarSystem) {
    let mut bodies = system.get_bodies();
    bodies.sort_by_key(|(id, _)| *id);

    println!("{system}");
    for (id, body) in bodies {
        println!("    {}: {:?} ({:?})", id, body.name, body.kind);
        println!("      Mass: {}", body.mass);
        println!("      Radius: {}", body.radius);
        println!("      SOI radius: {}", body.soi_radius);
        if let Some(orbit) = &body.orbit {
            let shape = orbit.shape();
            println!("      Orbit around: {:?}", system.parent_of(id));
            println!("        Semi-major axis: {}", shape.get_semi_major_axis());
            println!("        Eccentricity: {}", shape.get_eccentricity());
            println!("        Period: {}", shape.get_orbital_period());
            println!("        Normal: {}", shape.normal());
        }
    }
}

fn print_all_body_positions(lock: &mut StdoutLock, system: &SolarSystem) -> io::Result<()> {
    let mut bodies = system.get_bodies();
    bodies.sort_by_key(|(id, _)| *id);

    for (_, body) in bodies {
        writeln!(lock, "{}: {:?}", body.name, body.position)?;
    }
    Ok(())
}
