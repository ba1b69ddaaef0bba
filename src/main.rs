use std::env;

use actix_request_identifier::{IdReuse, RequestIdentifier};
use actix_web::web::Data;
use tracing_actix_web::TracingLogger;

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use payout_ledger::database::connect::{create_db_connection_pool, run_migrations};
use payout_ledger::routes::{
    admin_approve_handler, admin_list_handler, admin_reject_handler, balance_handler, create_withdrawal_handler,
    credit_handler, own_withdrawals_handler, set_bank_account_handler,
};
use payout_ledger::{admin, notify};

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();

    // setup tracing and use bunyan formatter
    let formatting_layer = BunyanFormattingLayer::new("payout-ledger".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(filter_fn(|metadata| *metadata.level() <= tracing::Level::INFO))
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let db = create_db_connection_pool();
    run_migrations(&db);

    let admin_directory = admin::create_admin_directory();
    let notifier = notify::create_notifier();

    let server = actix_web::HttpServer::new(move || {
        let db = db.clone();

        actix_web::App::new()
            .wrap(RequestIdentifier::with_uuid().use_incoming_id(IdReuse::UseIncoming))
            .wrap(TracingLogger::default())
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(admin_directory.clone()))
            .app_data(Data::new(notifier.clone()))
            .service(balance_handler)
            .service(set_bank_account_handler)
            .service(credit_handler)
            .service(create_withdrawal_handler)
            .service(own_withdrawals_handler)
            .service(admin_list_handler)
            .service(admin_approve_handler)
            .service(admin_reject_handler)
    });

    server
        .bind(env::var("BIND_ADDRESS").unwrap())
        .unwrap()
        .run()
        .await
        .unwrap();
}
