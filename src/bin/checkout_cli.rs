use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use food_checkout::{
    cache::{InMemorySessionStorage, SessionStorage, CONFIRMED_ORDER_KEY},
    config::{self, CheckoutConfig},
    events::EventSender,
    gateways::{BackendClient, HostedPaymentGateway},
    logging, metrics,
    models::{ClientEnvironment, OrderId},
    services::checkout::{
        CheckoutController, CheckoutSettings, CheckoutStep, Conclusion, ReturnParams, Teardown,
    },
};
use serde::Serialize;
use tracing::debug;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Pay(args) => handle_pay(&context, args, cli.json).await?,
        Commands::Resume(args) => handle_resume(&context, args, cli.json).await?,
        Commands::Cancel(args) => handle_cancel(&context, args, cli.json).await?,
    }

    if cli.print_metrics {
        let text = metrics::gather_metrics().map_err(|err| anyhow::anyhow!(err.to_string()))?;
        eprintln!("{}", text);
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "checkout-cli", about = "Drive food order checkout from the terminal", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Print Prometheus metrics to stderr after the command"
    )]
    print_metrics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an order and request payment for it
    Pay(PayArgs),
    /// Finish a checkout from the URL the gateway returned to
    Resume(ResumeArgs),
    /// Release an unpaid order without paying
    Cancel(CancelArgs),
}

#[derive(Args)]
struct PayArgs {
    #[arg(long, help = "Order identifier to pay for")]
    order_id: i64,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Pretend to be a mobile browser (redirect flow)"
    )]
    mobile: bool,
    #[arg(long, help = "Viewport width in CSS pixels; overrides --mobile")]
    viewport_width: Option<u32>,
}

#[derive(Args)]
struct ResumeArgs {
    #[arg(long, help = "Full return URL including the gateway's query parameters")]
    url: Url,
}

#[derive(Args)]
struct CancelArgs {
    #[arg(long, help = "Order identifier to release")]
    order_id: i64,
}

#[derive(Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum StepOutput {
    Redirect { order_id: OrderId, url: Url },
    Concluded(Conclusion),
}

#[derive(Serialize)]
struct CancelOutput {
    order_id: OrderId,
    teardown: &'static str,
}

struct CliContext {
    config: CheckoutConfig,
    backend: BackendClient,
    payments: HostedPaymentGateway,
    storage: Arc<InMemorySessionStorage>,
    event_sender: EventSender,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load checkout config")?;
        logging::init_tracing(&config.logging);

        let backend = BackendClient::from_config(&config).context("failed to build backend client")?;
        let payments = HostedPaymentGateway::from_config(&config, backend.clone())
            .context("failed to build payment gateway client")?;

        let (event_sender, mut event_rx) = EventSender::channel(32);
        tokio::spawn(async move {
            while let Some(record) = event_rx.recv().await {
                debug!(target: "checkout_cli", session_id = %record.session_id, event = ?record.event, "checkout event");
            }
        });

        Ok(Self {
            config,
            backend,
            payments,
            storage: Arc::new(InMemorySessionStorage::new()),
            event_sender,
        })
    }

    fn controller(&self) -> Result<CheckoutController> {
        let settings =
            CheckoutSettings::from_config(&self.config).context("invalid checkout settings")?;
        Ok(CheckoutController::new(
            Arc::new(self.backend.clone()),
            Arc::new(self.payments.clone()),
            self.storage.clone(),
            settings,
        )
        .with_events(self.event_sender.clone()))
    }
}

async fn handle_pay(context: &CliContext, args: PayArgs, json: bool) -> Result<()> {
    let order_id = OrderId(args.order_id);
    let mut controller = context.controller()?;

    let order = match controller.begin_checkout(order_id).await {
        Ok(order) => order,
        Err(err) => anyhow::bail!(err.user_message()),
    };
    if !json {
        println!(
            "Order {} • {} • {} KRW",
            order.order_id,
            order.payment_title(),
            order.total_amount
        );
    }

    let environment = match (args.viewport_width, args.mobile) {
        (Some(width), _) => ClientEnvironment {
            viewport_width: Some(width),
            user_agent: None,
        },
        (None, true) => ClientEnvironment::mobile(),
        (None, false) => ClientEnvironment::desktop(),
    };

    let step = controller
        .request_payment(&environment)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    render_step(context, order_id, step, json).await?;

    // A redirect leaves the order to the gateway; anything else is settled.
    controller.on_session_teardown().await;
    Ok(())
}

async fn handle_resume(context: &CliContext, args: ResumeArgs, json: bool) -> Result<()> {
    let params = ReturnParams::from_url(&args.url);
    let mut controller = context.controller()?;

    let step = controller
        .resume_from_return(&params)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    let order_id = params.order_id().unwrap_or(OrderId(0));
    render_step(context, order_id, step, json).await?;

    controller.on_session_teardown().await;
    Ok(())
}

async fn handle_cancel(context: &CliContext, args: CancelArgs, json: bool) -> Result<()> {
    let order_id = OrderId(args.order_id);
    let mut controller = context.controller()?;

    if let Err(err) = controller.begin_checkout(order_id).await {
        anyhow::bail!(err.user_message());
    }
    let teardown = match controller.on_session_teardown().await {
        Teardown::NothingToRelease => "nothing_to_release",
        Teardown::Settled => "settled",
        Teardown::RedirectInFlight => "redirect_in_flight",
        Teardown::CancellationIssued => "cancellation_issued",
    };

    if json {
        print_json(&CancelOutput { order_id, teardown })?;
    } else {
        println!("Order {}: {}", order_id, teardown.replace('_', " "));
    }
    Ok(())
}

async fn render_step(
    context: &CliContext,
    order_id: OrderId,
    step: CheckoutStep,
    json: bool,
) -> Result<()> {
    match step {
        CheckoutStep::Redirect { url } => {
            if json {
                print_json(&StepOutput::Redirect { order_id, url })?;
            } else {
                println!("Continue payment in the browser:\n  {}", url);
                println!("Then run `checkout-cli resume --url <return url>`.");
            }
        }
        CheckoutStep::Concluded(conclusion) => {
            if json {
                print_json(&StepOutput::Concluded(conclusion))?;
            } else {
                render_conclusion(context, &conclusion).await;
            }
        }
    }
    Ok(())
}

async fn render_conclusion(context: &CliContext, conclusion: &Conclusion) {
    println!("{}", conclusion.message);
    if conclusion.succeeded() {
        if let Ok(Some(confirmed)) = context.storage.get(CONFIRMED_ORDER_KEY).await {
            println!("Confirmed order: {}", confirmed);
        }
    }
    if conclusion.navigation.delay.is_zero() {
        println!("Next: {}", conclusion.navigation.path);
    } else {
        println!(
            "Next: {} (after {} ms)",
            conclusion.navigation.path,
            conclusion.navigation.delay.as_millis()
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
