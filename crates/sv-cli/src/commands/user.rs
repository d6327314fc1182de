use anyhow::{Result, bail};
use sv_config::Config;
use sv_core::RegistrationForm;
use sv_engine::DocumentService;

use crate::cli::UserCommands;

pub async fn handle(cmd: UserCommands, config: &Config) -> Result<()> {
    let service = DocumentService::from_config(config).await?;
    match cmd {
        UserCommands::Create {
            email,
            admin,
            password,
        } => create(&service, email, admin, password).await,
        UserCommands::List => list(&service).await,
        UserCommands::Subscribe { email } => subscribe(&service, &email).await,
    }
}

async fn create(
    service: &DocumentService,
    email: String,
    admin: bool,
    password: Option<String>,
) -> Result<()> {
    let Some(password) = password else {
        bail!("A password is required (--password or SV_PASSWORD)");
    };

    // Same field rules as sign-up; the admin key only gates self-registration
    RegistrationForm {
        email: email.clone(),
        password: password.clone(),
        password2: password.clone(),
        is_admin: false,
        admin_key: None,
    }
    .validate(None)?;

    let user = service.create_account(&email, &password, admin).await?;

    println!("✓ Created user: {}", user.email);
    println!("  ID: {}", user.id);
    println!("  Admin: {}", user.is_admin);
    Ok(())
}

async fn list(service: &DocumentService) -> Result<()> {
    let users = service.list_users().await?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("Users:");
    for user in users {
        let role = if user.is_admin { "admin" } else { "user" };
        println!("  [{}] {} ({})", user.id, user.email, role);
        if user.is_subscribed {
            println!("    Subscribed, {} credit(s) left", user.subscription_count);
        }
    }
    Ok(())
}

async fn subscribe(service: &DocumentService, email: &str) -> Result<()> {
    let user = service.subscribe_email(email).await?;

    println!("✓ Subscribed {}", user.email);
    println!("  Credits: {}", user.subscription_count);
    if let Some(expires) = user.subscription_expires_at {
        println!("  Expires: {}", expires);
    }
    Ok(())
}
