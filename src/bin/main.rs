use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use skysurety_core::{Address, FlightStatus, ProtocolParams, UNIT};
use skysurety_root::SkysuretyNode;

#[derive(Parser)]
#[command(name = "skysurety", version, about = "Decentralized flight-delay insurance ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an end-to-end simulation: admission, insurance, oracle round,
    /// payout and withdrawal.
    Simulate {
        /// Passengers buying insurance against the delayed airline.
        #[arg(long, default_value_t = 3)]
        passengers: u64,
        /// Oracle operators registered before the status round.
        #[arg(long, default_value_t = 12)]
        oracles: u64,
    },
    /// Print the default protocol parameters as JSON.
    Params,
}

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Simulate {
            passengers,
            oracles,
        } => simulate(passengers, oracles),
        Command::Params => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ProtocolParams::default())?
            );
            Ok(())
        }
    }
}

fn simulate(passenger_count: u64, oracle_count: u64) -> Result<()> {
    let params = ProtocolParams::default();
    let genesis = Address::from_low_u64(1);
    let node = SkysuretyNode::genesis(params.clone(), genesis)?;

    // Admission: three fast-path airlines, then one by consensus vote.
    for n in 2..=4 {
        node.register_or_vote(genesis, Address::from_low_u64(n))?;
    }
    let fifth = Address::from_low_u64(5);
    node.register_or_vote(genesis, fifth)?;
    let status = node.register_or_vote(Address::from_low_u64(2), fifth)?;
    info!(
        "fifth airline admitted: {} with {} votes",
        status.registered, status.votes
    );

    // The delayed airline funds its escrow and sells insurance.
    let airline = Address::from_low_u64(2);
    node.verify_airline(airline, params.verification_fee)?;
    for p in 0..passenger_count {
        let passenger = Address::from_low_u64(100 + p);
        node.buy_insurance(passenger, airline, params.max_insurance_premium)?;
    }

    // Oracle population and the status round.
    for o in 0..oracle_count {
        node.register_oracle(
            Address::from_low_u64(1000 + o),
            params.oracle_registration_fee,
        )?;
    }
    let requester = Address::from_low_u64(100);
    let key = node.request_flight_status(requester, airline, "SS101", 1_700_000_000)?;
    let request = node
        .request(key)
        .context("request disappeared after opening")?;

    // Oracles holding the request index report an airline-caused delay;
    // register extras if the initial population cannot reach majority.
    let index = request.index;
    let mut holders: Vec<Address> = (0..oracle_count)
        .map(|o| Address::from_low_u64(1000 + o))
        .filter(|oracle| {
            node.oracle_indexes(*oracle)
                .is_some_and(|indexes| indexes.contains(&index))
        })
        .collect();
    let mut extra = oracle_count;
    while holders.len() < params.oracle_majority {
        if extra > oracle_count + 500 {
            bail!("could not assemble a majority of oracles for index {index}");
        }
        let oracle = Address::from_low_u64(1000 + extra);
        let indexes = node.register_oracle(oracle, params.oracle_registration_fee)?;
        if indexes.contains(&index) {
            holders.push(oracle);
        }
        extra += 1;
    }

    let mut sweep = None;
    for oracle in holders.iter().take(params.oracle_majority) {
        sweep = node.submit_oracle_response(
            *oracle,
            index,
            airline,
            &request.flight,
            request.timestamp,
            FlightStatus::LateAirline,
        )?;
    }
    let sweep = sweep.context("majority did not trigger the payout sweep")?;
    println!(
        "resolved {} as late-airline: {} passengers credited, {} total payout",
        request.flight,
        sweep.payouts.len(),
        sweep.total as f64 / UNIT as f64
    );

    // Passengers take their credit out.
    for (passenger, amount) in &sweep.payouts {
        node.withdraw(*passenger, *amount)?;
    }

    node.verify_conservation()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&node.summary())?
    );
    Ok(())
}
