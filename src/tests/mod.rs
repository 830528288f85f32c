// Update flow tests against scripted transport and flash doubles



mod upgrade_tests;
