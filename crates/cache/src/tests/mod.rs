mod helpers;

mod read_tests;
