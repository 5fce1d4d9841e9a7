mod auth;
mod budgets;
mod categories;
mod expenses;
mod health_check;
mod recurring;

pub use auth::{
    change_password, delete_account, get_current_user, login, logout, refresh, register,
};
pub use budgets::{
    budget_status, create_budget, delete_budget, get_budget, list_budgets, update_budget,
};
pub use categories::{
    create_category, delete_category, get_category, list_categories, update_category,
};
pub use expenses::{
    create_expense, delete_expense, expense_summary, get_expense, list_expenses, update_expense,
};
pub use health_check::health_check;
pub use recurring::{
    create_recurring_expense, delete_recurring_expense, get_recurring_expense,
    list_due_recurring_expenses, list_recurring_expenses, update_recurring_expense,
};
