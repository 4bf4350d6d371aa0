//! Link simulator: the three peripherals and their host sessions wired
//! over in-memory serial pipes, with optional byte loss and corruption.
//!
//! The gun's muzzle IR is aimed at the player's own vest so one process
//! exercises the full shot path: trigger press, NEC burst, GUNSHOT /
//! VESTSHOT reports, echoes, reloads, and a shield refresh - under
//! whatever impairment the command line asks for.
//!
//! ```text
//! cargo run --bin linksim -- --shots 6 --flip-prob 0.002 --seed 7
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taglink_core::{
    Gun, Hand, ImuCalibration, ImuSample, Vest, GunState, VestState, MAG_SIZE,
};
use taglink_host::pipe::{pipe_pair, LossyLink, ManualClock};
use taglink_host::session::{HostSession, SessionEvent};
use taglink_host::sim::{ir_channel, PixelStrip, ScriptedImu, ScriptedTrigger};
use taglink_host::BindingConfig;

#[derive(Parser, Debug)]
#[command(name = "linksim", about = "Simulate the peripheral link over an impaired serial bridge")]
struct Args {
    /// Trigger presses to script.
    #[arg(long, default_value_t = 6)]
    shots: u32,

    /// Probability of dropping each byte on the wire.
    #[arg(long, default_value_t = 0.0)]
    drop_prob: f64,

    /// Probability of flipping one bit in each byte on the wire.
    #[arg(long, default_value_t = 0.0)]
    flip_prob: f64,

    /// RNG seed for reproducible impairment.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Simulated match length in milliseconds.
    #[arg(long, default_value_t = 15_000)]
    duration_ms: u64,

    /// Player binding file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => BindingConfig::load(path)?,
        None => BindingConfig::default(),
    };
    info!(player = config.player_id, "simulating relay");

    let clock = ManualClock::new();

    // Gun rig.
    let (gun_dev_end, gun_host_end) = pipe_pair();
    let gun_dev_serial = LossyLink::new(gun_dev_end, args.seed, args.drop_prob, args.flip_prob);
    let gun_host_serial =
        LossyLink::new(gun_host_end, args.seed ^ 1, args.drop_prob, args.flip_prob);
    let (trigger, trigger_level) = ScriptedTrigger::new();
    let (gun_imu, _gun_motion) = ScriptedImu::new(ImuSample::default());
    let (muzzle, vest_eye) = ir_channel();
    let (gun_leds, gun_pixels) = PixelStrip::new(MAG_SIZE as usize);
    let mut gun = Gun::new(
        gun_dev_serial,
        clock.clone(),
        trigger,
        gun_imu,
        muzzle,
        gun_leds,
        ImuCalibration::default(),
    );
    let mut gun_session = HostSession::gun(gun_host_serial, clock.clone(), GunState::default());

    // Vest rig, watching the gun's muzzle.
    let (vest_dev_end, vest_host_end) = pipe_pair();
    let vest_dev_serial = LossyLink::new(vest_dev_end, args.seed ^ 2, args.drop_prob, args.flip_prob);
    let vest_host_serial =
        LossyLink::new(vest_host_end, args.seed ^ 3, args.drop_prob, args.flip_prob);
    let (vest_leds, vest_pixels) = PixelStrip::new(10);
    let mut vest = Vest::new(vest_dev_serial, clock.clone(), vest_eye, vest_leds);
    let mut vest_session = HostSession::vest(
        vest_host_serial,
        clock.clone(),
        VestState { shield: 30, health: 100 },
    );

    // Glove rig.
    let (hand_dev_end, hand_host_end) = pipe_pair();
    let hand_dev_serial = LossyLink::new(hand_dev_end, args.seed ^ 4, args.drop_prob, args.flip_prob);
    let hand_host_serial =
        LossyLink::new(hand_host_end, args.seed ^ 5, args.drop_prob, args.flip_prob);
    let (hand_imu, _hand_motion) = ScriptedImu::new(ImuSample::default());
    let mut hand = Hand::new(hand_dev_serial, clock.clone(), hand_imu, ImuCalibration::default());
    let mut hand_session = HostSession::hand(hand_host_serial, clock.clone());

    gun_session.connect()?;
    vest_session.connect()?;
    hand_session.connect()?;

    let mut shots_scripted = 0u32;
    let mut shots_registered = 0u32;
    let mut hits_registered = 0u32;
    let mut imu_frames = 0u64;
    let mut next_press_ms = 500u64;

    for now in 0..args.duration_ms {
        // Script: a 60 ms press every 400 ms until the budget is spent.
        if shots_scripted < args.shots && now == next_press_ms {
            trigger_level.set(true);
            shots_scripted += 1;
        }
        if now == next_press_ms + 60 {
            trigger_level.set(false);
            next_press_ms += 400;
        }

        gun.poll().map_err(|e| anyhow::anyhow!("gun poll: {e:?}"))?;
        vest.poll().map_err(|e| anyhow::anyhow!("vest poll: {e:?}"))?;
        hand.poll().map_err(|e| anyhow::anyhow!("hand poll: {e:?}"))?;

        for event in gun_session.poll()? {
            match event {
                SessionEvent::ShotRegistered(state) => {
                    shots_registered += 1;
                    if state.bullets == 0 {
                        info!("magazine empty, reloading");
                        if let Err(err) = gun_session.send_reload() {
                            warn!(%err, "reload deferred");
                        }
                    }
                }
                SessionEvent::Imu(_) => imu_frames += 1,
                SessionEvent::SessionDown => gun_session.connect()?,
                _ => {}
            }
        }
        for event in vest_session.poll()? {
            match event {
                SessionEvent::HitRegistered(state) => {
                    hits_registered += 1;
                    if state.shield == 0 {
                        info!("shield down, refreshing");
                        if let Err(err) = vest_session.refresh_shield() {
                            warn!(%err, "shield refresh deferred");
                        }
                    }
                }
                SessionEvent::SessionDown => vest_session.connect()?,
                _ => {}
            }
        }
        for event in hand_session.poll()? {
            match event {
                SessionEvent::Imu(_) => imu_frames += 1,
                SessionEvent::SessionDown => hand_session.connect()?,
                _ => {}
            }
        }

        clock.advance(1);
    }

    info!(
        shots_scripted,
        shots_registered,
        hits_registered,
        imu_frames,
        "simulation finished"
    );
    info!(
        device = ?gun.canonical_state(),
        host = ?gun_session.gun_state(),
        lit = PixelStrip::lit_count(&gun_pixels),
        "gun state"
    );
    info!(
        device = ?vest.canonical_state(),
        host = ?vest_session.vest_state(),
        lit = PixelStrip::lit_count(&vest_pixels),
        "vest state"
    );

    if gun_session.gun_state() != Some(gun.canonical_state()) {
        warn!("gun mirror diverged from device canonical state");
    }
    if vest_session.vest_state() != Some(vest.canonical_state()) {
        warn!("vest mirror diverged from device canonical state");
    }
    Ok(())
}
