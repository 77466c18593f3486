use std::error::Error;
use std::sync::Arc;

use dotenv::dotenv;
use log::{info, initialize_logger, o};
use structopt::StructOpt;
use time::{Date, Duration, Format, OffsetDateTime};

use studio::catalog::Catalog;
use studio::class::NewClass;
use studio::config::get_variable;
use studio::db::PgDb;

#[derive(Debug, StructOpt)]
#[structopt(name = "seed-classes", about = "Add fitness classes to the catalog")]
enum Opt {
    /// Add a single class
    Add {
        /// The name of the class
        #[structopt(long)]
        name: String,

        /// The person teaching it
        #[structopt(long)]
        instructor: String,

        /// When it starts, as an RFC 3339 timestamp
        #[structopt(long, parse(try_from_str = parse_start))]
        start: OffsetDateTime,

        /// How many people can book it
        #[structopt(long)]
        slots: i32,
    },

    /// Add a week’s worth of sample classes unless some are already scheduled
    Sample,
}

fn parse_start(s: &str) -> Result<OffsetDateTime, time::ParseError> {
    OffsetDateTime::parse(s, Format::Rfc3339)
}

/// Yoga, Zumba and HIIT on consecutive days starting tomorrow.
fn sample_classes(today: Date) -> Result<Vec<NewClass>, Box<dyn Error>> {
    let samples = [
        ("Yoga", "Alice", 10, 5),
        ("Zumba", "Bob", 11, 8),
        ("HIIT", "Charlie", 12, 6),
    ];

    let mut classes = vec![];

    for (offset, (name, instructor, hour, slots)) in samples.iter().enumerate() {
        let day = today + Duration::days(offset as i64 + 1);
        let start = day.with_hms(*hour, 0, 0)?.assume_utc();

        classes.push(NewClass::new(name, instructor, start, *slots));
    }

    Ok(classes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = Arc::new(initialize_logger());

    let connection_string = get_variable("STUDIO_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from STUDIO_DB_CONNECTION_STRING");
    let catalog = Catalog::new(logger.clone(), Arc::new(PgDb::new(pool)));

    let classes = match opt {
        Opt::Add {
            name,
            instructor,
            start,
            slots,
        } => vec![NewClass::new(name, instructor, start, slots)],
        Opt::Sample => {
            let now = OffsetDateTime::now_utc();

            if !catalog.list_upcoming(now).await?.is_empty() {
                info!(logger, "Upcoming classes already scheduled, not adding samples");
                return Ok(());
            }

            sample_classes(now.date())?
        }
    };

    for class in classes {
        let logger = logger.new(o!("name" => class.name.clone()));
        info!(logger, "Adding class..."; "start_time" => %class.start_time, "slots" => class.slots);

        let class = catalog.add(class).await?;
        info!(logger, "Added class"; "id" => %class.id);
    }

    Ok(())
}
