use std::{process, sync::Arc, time::Duration};

use penfeed::{
    application::{
        accounts::AccountService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        groups::GroupService,
        posts::PostService,
        repos::{CommentsRepo, FollowsRepo, GroupsRepo, PostsRepo, SessionsRepo, UsersRepo},
    },
    cache::FeedCache,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        media::MediaStorage,
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Groups(args) => match args.command {
            config::GroupsCommand::Create(create) => run_create_group(settings, create).await,
            config::GroupsCommand::List(_) => run_list_groups(settings).await,
        },
        config::Command::Users(args) => match args.command {
            config::UsersCommand::Promote(promote) => run_promote_user(settings, promote).await,
        },
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();

    let media = Arc::new(
        MediaStorage::new(settings.media.directory.clone()).map_err(InfraError::from)?,
    );

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        users_repo.clone(),
        groups_repo.clone(),
        comments_repo.clone(),
        follows_repo.clone(),
        settings.feed.page_size,
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        groups_repo,
        comments_repo,
        media.clone(),
    ));
    let follows = Arc::new(FollowService::new(users_repo.clone(), follows_repo));
    let accounts = Arc::new(AccountService::new(
        users_repo,
        sessions_repo,
        settings.auth.pbkdf2_rounds,
        settings.auth.session_ttl,
    ));

    let feed_cache = FeedCache::new(settings.feed.cache_ttl);
    let max_request_bytes = usize::try_from(settings.media.max_request_bytes.get())
        .map_err(|_| InfraError::configuration("media.max_request_bytes does not fit in memory"))?;

    let http_state = HttpState {
        feed,
        posts,
        follows,
        accounts,
        feed_cache: feed_cache.clone(),
        media,
        session_cookie: settings.auth.session_cookie.clone(),
        max_request_bytes,
    };
    let admin_state = AdminState {
        feed_cache,
        health: repositories,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    match app.http_state.accounts.purge_expired_sessions().await {
        Ok(purged) => info!(target = "penfeed::serve", purged, "expired sessions purged"),
        Err(err) => warn!(
            target = "penfeed::serve",
            error = %err,
            "failed to purge expired sessions"
        ),
    }

    serve_http(&settings, app.http_state, app.admin_state).await
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_addr = settings.server.public_addr;
    let admin_addr = settings.server.admin_addr;
    let public_listener = TcpListener::bind(public_addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: public_addr,
            source,
        })?;
    let admin_listener = TcpListener::bind(admin_addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: admin_addr,
            source,
        })?;

    info!(
        target = "penfeed::serve",
        public = %public_addr,
        admin = %admin_addr,
        "listeners bound"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        info!(target = "penfeed::serve", "shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));

    let servers = async {
        try_join!(
            async {
                public_server.await.map_err(|source| InfraError::Serve {
                    listener: "public",
                    source,
                })
            },
            async {
                admin_server.await.map_err(|source| InfraError::Serve {
                    listener: "admin",
                    source,
                })
            },
        )
    };

    let grace = settings.server.graceful_shutdown;
    let result = tokio::select! {
        result = servers => result.map(|_| ()).map_err(AppError::from),
        () = shutdown_deadline(shutdown_rx, grace) => {
            warn!(
                target = "penfeed::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    };

    signal_task.abort();
    result
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

async fn shutdown_deadline(rx: watch::Receiver<bool>, grace: Duration) {
    shutdown_requested(rx).await;
    tokio::time::sleep(grace).await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "penfeed::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "penfeed::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn run_create_group(
    settings: config::Settings,
    args: config::CreateGroupArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups = GroupService::new(repositories);

    let group = groups
        .create_group(&args.title, args.slug.as_deref(), &args.description)
        .await?;
    info!(
        target = "penfeed::groups",
        id = group.id,
        slug = %group.slug,
        "group created"
    );
    println!("{}\t{}\t{}", group.id, group.slug, group.title);
    Ok(())
}

async fn run_list_groups(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups = GroupService::new(repositories);

    for group in groups.list_groups().await? {
        println!("{}\t{}\t{}", group.id, group.slug, group.title);
    }
    Ok(())
}

async fn run_promote_user(
    settings: config::Settings,
    args: config::PromoteUserArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories;
    let accounts = AccountService::new(
        users_repo,
        sessions_repo,
        settings.auth.pbkdf2_rounds,
        settings.auth.session_ttl,
    );

    let user = accounts.promote(&args.username).await?;
    info!(
        target = "penfeed::users",
        username = %user.username,
        "user promoted to staff"
    );
    Ok(())
}
