use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_files as fs;
use sqlx::PgPool;
use std::net::TcpListener;
use actix_web::dev::Server;

use crate::configuration::JwtSettings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    budget_status, change_password, create_budget, create_category, create_expense,
    create_recurring_expense, delete_account, delete_budget, delete_category, delete_expense,
    delete_recurring_expense, expense_summary, get_budget, get_category, get_current_user,
    get_expense, get_recurring_expense, health_check, list_budgets, list_categories,
    list_due_recurring_expenses, list_expenses, list_recurring_expenses, login, logout, refresh,
    register, update_budget, update_category, update_expense, update_recurring_expense,
};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())      // Standard logging
            .wrap(LoggerMiddleware)       // Custom logging

            // Shared state
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))

            // Protected routes (require JWT authentication)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/me/password", web::put().to(change_password))
                    .route("/me", web::delete().to(delete_account))
                    .route("/categories", web::get().to(list_categories))
                    .route("/categories", web::post().to(create_category))
                    .route("/categories/{id}", web::get().to(get_category))
                    .route("/categories/{id}", web::put().to(update_category))
                    .route("/categories/{id}", web::delete().to(delete_category))
                    // /expenses/summary must be registered before /expenses/{id}
                    .route("/expenses/summary", web::get().to(expense_summary))
                    .route("/expenses", web::get().to(list_expenses))
                    .route("/expenses", web::post().to(create_expense))
                    .route("/expenses/{id}", web::get().to(get_expense))
                    .route("/expenses/{id}", web::put().to(update_expense))
                    .route("/expenses/{id}", web::delete().to(delete_expense))
                    .route("/budgets", web::get().to(list_budgets))
                    .route("/budgets", web::post().to(create_budget))
                    .route("/budgets/{id}", web::get().to(get_budget))
                    .route("/budgets/{id}", web::put().to(update_budget))
                    .route("/budgets/{id}", web::delete().to(delete_budget))
                    .route("/budgets/{id}/status", web::get().to(budget_status))
                    .route("/recurring/due", web::get().to(list_due_recurring_expenses))
                    .route("/recurring", web::get().to(list_recurring_expenses))
                    .route("/recurring", web::post().to(create_recurring_expense))
                    .route("/recurring/{id}", web::get().to(get_recurring_expense))
                    .route("/recurring/{id}", web::put().to(update_recurring_expense))
                    .route("/recurring/{id}", web::delete().to(delete_recurring_expense))
            )

            // Static file serving (must be last to not override API routes)
            .service(fs::Files::new("/", "./public").index_file("index.html"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
