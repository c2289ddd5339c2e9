pub mod currency_rates_job;
